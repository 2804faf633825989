//! Session facade
//!
//! A session owns one store connection plus the catalog, shadow manager,
//! record writer and planner built on it. Everything here is synchronous and
//! runs on the caller's thread.
//!
//! ```rust,no_run
//! use shadowtab::{Config, QueryRequest, Session};
//!
//! let session = Session::open(&Config::load_default())?;
//! let n = session.count("hmi.m_45s", &QueryRequest::count().pk_filter("t_rec > 100"))?;
//! # Ok::<(), shadowtab::Error>(())
//! ```

use crate::catalog::{create_series, SchemaCatalog, Series, SeriesDefinition};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::planner::{Projection, QueryExecutor, QueryPlan, QueryPlanner, QueryRequest, QueryResult};
use crate::records::{Record, RecordWriter};
use crate::shadow::{AuditReport, CreateOutcome, CreationGate, ShadowIndexManager};
use crate::store::{RelationalStore, Row, SqliteStore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One connection and the components built on it
pub struct Session<S: RelationalStore = SqliteStore> {
    store: S,
    catalog: SchemaCatalog,
    shadow: ShadowIndexManager,
    writer: RecordWriter,
    planner: QueryPlanner,
    config: Config,
}

impl Session<SqliteStore> {
    /// Open the configured SQLite database
    pub fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(Path::new(&config.store.path))?
            .with_busy_timeout(config.store.busy_timeout_ms)?;
        Self::with_store(store, config.clone())
    }

    /// Open a private in-memory database
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(SqliteStore::open_in_memory()?, config)
    }
}

impl<S: RelationalStore> Session<S> {
    /// Build a session on an open store, loading the catalog
    ///
    /// Uses the process-wide creation gate, switched on when the
    /// configuration allows creation.
    pub fn with_store(store: S, config: Config) -> Result<Self> {
        let catalog = SchemaCatalog::load(&store)?;
        let gate = CreationGate::global().clone();
        if config.shadow.allow_create {
            gate.set(true);
        }
        let shadow = ShadowIndexManager::new(gate, config.shadow.suffix.clone(), config.shadow.sync);
        let writer = RecordWriter::new(shadow.clone());
        let planner = QueryPlanner::new(&config.planner, config.shadow.suffix.clone());
        info!(
            "Session opened with {} series ({} sync)",
            catalog.len(),
            config.shadow.sync
        );
        Ok(Self {
            store,
            catalog,
            shadow,
            writer,
            planner,
            config,
        })
    }

    /// Use a private creation gate instead of the process-wide one
    pub fn with_gate(mut self, gate: CreationGate) -> Self {
        self.shadow = ShadowIndexManager::new(gate, self.shadow.suffix(), self.shadow.sync_mode());
        self.writer = RecordWriter::new(self.shadow.clone());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn writer(&self) -> &RecordWriter {
        &self.writer
    }

    pub fn shadow_manager(&self) -> &ShadowIndexManager {
        &self.shadow
    }

    pub fn series(&self, name: &str) -> Result<Arc<Series>> {
        self.catalog.get(name)
    }

    /// Reload a series from the seed tables
    pub fn refresh(&self, name: &str) -> Result<Arc<Series>> {
        self.catalog.refresh(&self.store, name)
    }

    /// Create a series, and its shadow index when the definition asks for one
    pub fn create_series(&self, definition: &SeriesDefinition) -> Result<Arc<Series>> {
        if definition.create_shadow {
            // Refuse before any DDL runs
            self.shadow.gate().check(&definition.name)?;
        }
        let series = create_series(&self.store, &self.catalog, definition)?;
        if definition.create_shadow {
            self.shadow.create(&self.store, &series, None)?;
        }
        Ok(series)
    }

    // ==================== Administration ====================

    pub fn shadow_index_exists(&self, series: &str) -> Result<bool> {
        self.shadow.exists(&self.store, &*self.series(series)?)
    }

    pub fn create_shadow_index(&self, series: &str, alternate: Option<&str>) -> Result<CreateOutcome> {
        self.shadow.create(&self.store, &*self.series(series)?, alternate)
    }

    pub fn drop_shadow_index(&self, series: &str, alternate: Option<&str>) -> Result<bool> {
        self.shadow.drop(&self.store, &*self.series(series)?, alternate)
    }

    /// Switch the creation gate this session uses
    pub fn enable_shadow_creation(&self, enabled: bool) {
        info!("Shadow index creation {}", if enabled { "enabled" } else { "disabled" });
        self.shadow.gate().set(enabled);
    }

    /// Compare a shadow index with its primary table
    pub fn check_shadow(&self, series: &str) -> Result<AuditReport> {
        self.shadow.audit(&self.store, &*self.series(series)?)
    }

    // ==================== Records ====================

    pub fn insert(&self, series: &str, record: &Record) -> Result<i64> {
        self.writer.insert(&self.store, &*self.series(series)?, record)
    }

    pub fn insert_all(&self, series: &str, records: &[Record]) -> Result<Vec<i64>> {
        self.writer.insert_all(&self.store, &*self.series(series)?, records)
    }

    pub fn delete(&self, series: &str, recnum: i64) -> Result<bool> {
        self.writer.delete(&self.store, &*self.series(series)?, recnum)
    }

    // ==================== Queries ====================

    /// Plan a request against a series that has a shadow index
    pub fn plan(&self, series: &str, request: &QueryRequest) -> Result<QueryPlan> {
        let series = self.series(series)?;
        if !self.shadow.exists(&self.store, &series)? {
            return Err(Error::InvalidRequest(format!(
                "series {} has no shadow index",
                series.name()
            )));
        }
        self.planner.plan(&series, request)
    }

    /// Rendered statements for a request, joined by the batch separator
    pub fn explain(&self, series: &str, request: &QueryRequest) -> Result<String> {
        self.plan(series, request)?.explain(self.store.dialect())
    }

    /// Number of current versions matching a request's filters
    pub fn count(&self, series: &str, request: &QueryRequest) -> Result<u64> {
        let request = QueryRequest {
            projection: Projection::Count,
            ..request.clone()
        };
        let plan = self.plan(series, &request)?;
        QueryExecutor::new(&self.store).count(&plan)
    }

    /// Current versions matching a request
    pub fn select(&self, series: &str, request: &QueryRequest) -> Result<QueryResult> {
        if request.is_count() {
            return Err(Error::InvalidRequest(
                "count requests go through count()".to_string(),
            ));
        }
        let plan = self.plan(series, request)?;
        QueryExecutor::new(&self.store).fetch(&plan)
    }

    /// Current versions matching a request, delivered row by row
    pub fn stream(
        &self,
        series: &str,
        request: &QueryRequest,
        f: &mut dyn FnMut(&Row) -> bool,
    ) -> Result<usize> {
        let request = request.clone().streaming(true);
        if request.is_count() {
            return Err(Error::InvalidRequest(
                "count requests go through count()".to_string(),
            ));
        }
        let plan = self.plan(series, &request)?;
        QueryExecutor::new(&self.store).stream(&plan, f)
    }
}
