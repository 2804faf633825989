//! Shadow Index Manager - builds, probes, drops and audits shadow indexes
//!
//! # Layout
//!
//! ```text
//! primary  "hmi.m_45s"         (recnum, t_rec, camera, datamean, ...)
//! shadow   "hmi.m_45s_shadow"  (t_rec, camera, nrecords, recnum)  PRIMARY KEY (t_rec, camera)
//! ```
//!
//! Creation runs in one transaction: table, one index per primary-key
//! attribute plus one on `recnum`, copied grants, the synchronization trigger
//! (canonical name and trigger sync only), then a single grouped populate.
//! The cached state becomes `Present` only after commit.

use super::gate::CreationGate;
use super::grants::grant_statements;
use super::trigger::{drop_program, sync_program, trigger_name};
use super::SyncMode;
use crate::catalog::{Series, ShadowState, NRECORDS, RECNUM};
use crate::error::{Error, Result};
use crate::sql::{ColumnDef, ColumnType, Expr, Relation, Select, Source, Statement, TriggerEvent};
use crate::store::{in_transaction, RelationalStore, TextRow};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Result of a create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CreateOutcome {
    /// Index built and populated with `groups` shadow rows
    Created { name: String, groups: usize },
    /// Canonical index already existed; nothing was done
    AlreadyPresent { name: String },
}

/// A shadow row whose count or row identifier disagrees with the primary table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleRow {
    pub tuple: Vec<Option<String>>,
    pub expected: (i64, i64),
    pub actual: (i64, i64),
}

/// Comparison of a shadow index with a full aggregate of its primary table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub series: String,
    pub groups: usize,
    pub shadow_rows: usize,
    /// Groups with no shadow row
    pub missing: Vec<Vec<Option<String>>>,
    /// Shadow rows with wrong count or row identifier
    pub stale: Vec<StaleRow>,
    /// Shadow rows with no group
    pub orphans: Vec<Vec<Option<String>>>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty() && self.orphans.is_empty()
    }
}

/// Creates, probes, drops and audits shadow indexes
#[derive(Debug, Clone)]
pub struct ShadowIndexManager {
    gate: CreationGate,
    suffix: String,
    sync: SyncMode,
}

impl ShadowIndexManager {
    pub fn new(gate: CreationGate, suffix: impl Into<String>, sync: SyncMode) -> Self {
        Self {
            gate,
            suffix: suffix.into(),
            sync,
        }
    }

    pub fn gate(&self) -> &CreationGate {
        &self.gate
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// Canonical shadow relation of a series
    pub fn shadow_relation(&self, series: &Series) -> Relation {
        Relation::named(series.shadow_name(&self.suffix))
    }

    /// Resolve an optional alternate name; the flag is true for the canonical name
    fn target_name(&self, series: &Series, alternate: Option<&str>) -> (String, bool) {
        let canonical = series.shadow_name(&self.suffix);
        match alternate.map(|a| a.trim().to_lowercase()) {
            Some(alt) if alt != canonical => (alt, false),
            _ => (canonical, true),
        }
    }

    // ==================== Existence ====================

    /// Check whether the series has its canonical shadow index
    ///
    /// A resolved cached state is trusted; otherwise the store is probed once
    /// and the answer cached on the series.
    pub fn exists<S: RelationalStore + ?Sized>(&self, store: &S, series: &Series) -> Result<bool> {
        if let Some(flag) = series.shadow_state().as_flag() {
            return Ok(flag);
        }
        let present = store.relation_exists(&series.shadow_name(&self.suffix))?;
        series.set_shadow_state(ShadowState::from_flag(present));
        debug!("Probed shadow index of {}: {}", series.name(), present);
        Ok(present)
    }

    /// Check whether the store keeps the canonical shadow index in step itself
    ///
    /// Decided by what is installed, not by this manager's sync mode, so an
    /// index built under one mode stays maintained when written under the
    /// other. A half-installed trigger pair is an error.
    pub fn synced_by_trigger<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
    ) -> Result<bool> {
        if let Some(installed) = series.sync_trigger() {
            return Ok(installed);
        }
        let installed =
            |event| store.trigger_exists(&trigger_name(series, &self.suffix, event));
        let on_insert = installed(TriggerEvent::AfterInsert)?;
        let on_delete = installed(TriggerEvent::AfterDelete)?;
        if on_insert != on_delete {
            return Err(Error::Inconsistent {
                series: series.name().to_string(),
                detail: format!(
                    "only the {} synchronization trigger is installed",
                    if on_insert { "insert" } else { "delete" }
                ),
            });
        }
        series.set_sync_trigger(Some(on_insert));
        debug!("Synchronization trigger of {} installed: {}", series.name(), on_insert);
        Ok(on_insert)
    }

    // ==================== Creation ====================

    /// Statements that build and populate a shadow index
    pub fn create_statements<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        name: &str,
        canonical: bool,
    ) -> Result<Vec<Statement>> {
        let shadow = Relation::named(name);
        let mut stmts = Vec::new();

        let mut columns: Vec<ColumnDef> = Vec::new();
        for key in series.primary_keys() {
            columns.push(ColumnDef::new(
                key.clone(),
                ColumnType::Value(series.attribute_type(key)?),
            ));
        }
        columns.push(ColumnDef::new(NRECORDS, ColumnType::Count));
        columns.push(ColumnDef::new(RECNUM, ColumnType::RecordNumber { auto: false }));
        stmts.push(Statement::CreateTable {
            relation: shadow.clone(),
            columns,
            primary_key: series.primary_keys().to_vec(),
        });

        // Single-attribute filters would otherwise only hit the leading key column
        for column in series.primary_keys().iter().map(String::as_str).chain([RECNUM]) {
            stmts.push(Statement::CreateIndex {
                name: format!("{}_{}", name, column),
                relation: shadow.clone(),
                columns: vec![column.to_string()],
            });
        }

        let acl = store.table_grants(series.name())?;
        stmts.extend(grant_statements(&acl, &shadow));

        if canonical && self.sync == SyncMode::Trigger {
            stmts.extend(sync_program(series, &self.suffix));
        }

        let keys: Vec<Expr> = series
            .primary_keys()
            .iter()
            .map(|k| Expr::col(k.as_str()))
            .collect();
        let mut projection = keys.clone();
        projection.push(Expr::CountStar);
        projection.push(Expr::max(Expr::col(RECNUM)));
        let mut target_columns = series.primary_keys().to_vec();
        target_columns.push(NRECORDS.to_string());
        target_columns.push(RECNUM.to_string());
        stmts.push(Statement::InsertSelect {
            relation: shadow,
            columns: target_columns,
            query: Select::new(projection)
                .from(Source::new(series.relation()))
                .group_by(keys),
        });

        Ok(stmts)
    }

    /// Build the shadow index of a series
    ///
    /// With no alternate name an existing canonical index is left alone.
    /// Alternate-named indexes are standalone copies without a trigger.
    pub fn create<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        alternate: Option<&str>,
    ) -> Result<CreateOutcome> {
        // Checked before any statement is issued
        self.gate.check(series.name())?;

        let (name, canonical) = self.target_name(series, alternate);
        if canonical {
            if self.exists(store, series)? {
                warn!("Shadow index {} already exists, not creating", name);
                return Ok(CreateOutcome::AlreadyPresent { name });
            }
        } else if store.relation_exists(&name)? {
            return Err(Error::InvalidRequest(format!("relation {} already exists", name)));
        }

        let dialect = store.dialect();
        let stmts = self.create_statements(store, series, &name, canonical)?;
        let rendered = stmts
            .iter()
            .map(|s| dialect.render(s))
            .collect::<Result<Vec<_>>>()?;

        info!("Creating shadow index {} for {}", name, series.name());
        let result = in_transaction(store, || {
            let mut groups = 0;
            let last = rendered.len().saturating_sub(1);
            for (i, sql) in rendered.iter().enumerate() {
                if i == last {
                    groups = store.execute(sql)?;
                } else {
                    store.execute_batch(sql)?;
                }
            }
            Ok(groups)
        });

        match result {
            Ok(groups) => {
                if canonical {
                    series.set_shadow_state(ShadowState::Present);
                    series.set_sync_trigger(Some(self.sync == SyncMode::Trigger));
                }
                info!("Shadow index {} populated with {} groups", name, groups);
                Ok(CreateOutcome::Created { name, groups })
            }
            Err(e) => {
                if canonical {
                    series.set_shadow_state(ShadowState::Unknown);
                    series.set_sync_trigger(None);
                }
                Err(e)
            }
        }
    }

    // ==================== Removal ====================

    /// Drop a shadow index and, for the canonical name, its triggers
    ///
    /// Returns false when there was nothing to drop.
    pub fn drop<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        alternate: Option<&str>,
    ) -> Result<bool> {
        let (name, canonical) = self.target_name(series, alternate);
        let dialect = store.dialect();

        let mut stmts = Vec::new();
        if canonical {
            stmts.extend(drop_program(series, &self.suffix));
        }
        let present = store.relation_exists(&name)?;
        if present {
            stmts.push(Statement::DropTable {
                relation: Relation::named(name.clone()),
                if_exists: true,
            });
        }
        let rendered = stmts
            .iter()
            .map(|s| dialect.render(s))
            .collect::<Result<Vec<_>>>()?;

        in_transaction(store, || {
            for sql in &rendered {
                store.execute_batch(sql)?;
            }
            Ok(())
        })?;

        if canonical {
            series.set_shadow_state(ShadowState::Absent);
            series.set_sync_trigger(Some(false));
        }
        if present {
            info!("Dropped shadow index {}", name);
        } else {
            debug!("No shadow index {} to drop", name);
        }
        Ok(present)
    }

    // ==================== Audit ====================

    /// Compare the shadow index with a full aggregate of the primary table
    pub fn audit<S: RelationalStore + ?Sized>(&self, store: &S, series: &Series) -> Result<AuditReport> {
        if !self.exists(store, series)? {
            return Err(Error::InvalidRequest(format!(
                "series {} has no shadow index",
                series.name()
            )));
        }
        let dialect = store.dialect();
        let width = series.primary_keys().len();
        let keys: Vec<Expr> = series
            .primary_keys()
            .iter()
            .map(|k| Expr::col(k.as_str()))
            .collect();

        let mut aggregate = keys.clone();
        aggregate.push(Expr::CountStar);
        aggregate.push(Expr::max(Expr::col(RECNUM)));
        let groups = store.query_text(&dialect.render(&Statement::Select(
            Select::new(aggregate)
                .from(Source::new(series.relation()))
                .group_by(keys.clone()),
        ))?)?;

        let mut stored = keys;
        stored.push(Expr::col(NRECORDS));
        stored.push(Expr::col(RECNUM));
        let shadow_rows = store.query_text(&dialect.render(&Statement::Select(
            Select::new(stored).from(Source::new(self.shadow_relation(series))),
        ))?)?;

        let index = |rows: &[TextRow]| -> Result<BTreeMap<Vec<Option<String>>, (i64, i64)>> {
            let mut map = BTreeMap::new();
            for row in rows {
                if row.len() != width + 2 {
                    return Err(crate::store::StoreError::BadFieldCount {
                        expected: width + 2,
                        actual: row.len(),
                    }
                    .into());
                }
                let num = |i: usize| {
                    row[i]
                        .as_deref()
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(-1)
                };
                map.insert(row[..width].to_vec(), (num(width), num(width + 1)));
            }
            Ok(map)
        };
        let expected = index(&groups)?;
        let actual = index(&shadow_rows)?;

        let mut report = AuditReport {
            series: series.name().to_string(),
            groups: expected.len(),
            shadow_rows: shadow_rows.len(),
            ..Default::default()
        };
        for (tuple, want) in &expected {
            match actual.get(tuple) {
                None => report.missing.push(tuple.clone()),
                Some(got) if got != want => report.stale.push(StaleRow {
                    tuple: tuple.clone(),
                    expected: *want,
                    actual: *got,
                }),
                Some(_) => {}
            }
        }
        report.orphans = actual
            .keys()
            .filter(|tuple| !expected.contains_key(*tuple))
            .cloned()
            .collect();

        if !report.is_consistent() {
            warn!(
                "Shadow index of {} disagrees: {} missing, {} stale, {} orphan",
                series.name(),
                report.missing.len(),
                report.stale.len(),
                report.orphans.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{create_series, SchemaCatalog, SeriesDefinition};
    use crate::error::ErrorKind;
    use crate::store::SqliteStore;
    use std::sync::Arc;

    fn setup() -> (SqliteStore, Arc<Series>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = SchemaCatalog::new();
        let def = SeriesDefinition::from_json(
            r#"{
                "name": "su.lev0",
                "attributes": [
                    { "name": "fsn", "type": "int" },
                    { "name": "camera", "type": "short" },
                    { "name": "quality", "type": "int" }
                ],
                "primary_key": ["fsn", "camera"]
            }"#,
        )
        .unwrap();
        let series = create_series(&store, &catalog, &def).unwrap();
        store
            .execute(
                "INSERT INTO \"su.lev0\" (fsn, camera, quality) VALUES \
                 (1, 1, 0), (1, 1, 5), (2, 1, 0), (2, 2, 0), (1, 1, 9)",
            )
            .unwrap();
        (store, series)
    }

    fn manager(enabled: bool, sync: SyncMode) -> ShadowIndexManager {
        ShadowIndexManager::new(CreationGate::new(enabled), "_shadow", sync)
    }

    #[test]
    fn test_create_requires_gate() {
        let (store, series) = setup();
        let err = manager(false, SyncMode::Trigger)
            .create(&store, &series, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(!store.relation_exists("su.lev0_shadow").unwrap());
    }

    #[test]
    fn test_create_populates_and_is_idempotent() {
        let (store, series) = setup();
        let mgr = manager(true, SyncMode::Trigger);

        let outcome = mgr.create(&store, &series, None).unwrap();
        assert_eq!(
            outcome,
            CreateOutcome::Created {
                name: "su.lev0_shadow".to_string(),
                groups: 3
            }
        );
        assert_eq!(series.shadow_state(), ShadowState::Present);

        let row = store
            .query_binary("SELECT nrecords, recnum FROM \"su.lev0_shadow\" WHERE fsn = 1 AND camera = 1")
            .unwrap();
        assert_eq!(row[0][0].as_i64(), Some(3));
        assert_eq!(row[0][1].as_i64(), Some(5));

        let again = mgr.create(&store, &series, None).unwrap();
        assert!(matches!(again, CreateOutcome::AlreadyPresent { .. }));
        assert_eq!(
            store.query_i64("SELECT count(*) FROM \"su.lev0_shadow\"").unwrap(),
            Some(3)
        );
        assert!(mgr.audit(&store, &series).unwrap().is_consistent());
    }

    #[test]
    fn test_exists_probes_once() {
        let (store, series) = setup();
        let mgr = manager(true, SyncMode::Trigger);
        series.set_shadow_state(ShadowState::Unknown);
        assert!(!mgr.exists(&store, &series).unwrap());
        assert_eq!(series.shadow_state(), ShadowState::Absent);

        // Created behind the cache's back; the resolved state is trusted
        store
            .execute("CREATE TABLE \"su.lev0_shadow\" (fsn INTEGER)")
            .unwrap();
        assert!(!mgr.exists(&store, &series).unwrap());
    }

    #[test]
    fn test_alternate_name_has_no_trigger() {
        let (store, series) = setup();
        let mgr = manager(true, SyncMode::Trigger);
        let outcome = mgr.create(&store, &series, Some("su.lev0_copy")).unwrap();
        assert!(matches!(outcome, CreateOutcome::Created { groups: 3, .. }));
        assert_eq!(series.shadow_state(), ShadowState::Absent);
        assert_eq!(
            store
                .query_i64("SELECT count(*) FROM sqlite_master WHERE type = 'trigger'")
                .unwrap(),
            Some(0)
        );
        assert!(mgr.create(&store, &series, Some("su.lev0_copy")).is_err());
        assert!(mgr.drop(&store, &series, Some("su.lev0_copy")).unwrap());
        assert!(!store.relation_exists("su.lev0_copy").unwrap());
    }

    #[test]
    fn test_failed_create_is_not_present() {
        let (store, series) = setup();
        // A conflicting index name makes the build fail midway
        store
            .execute("CREATE TABLE dummy (x INTEGER)")
            .unwrap();
        store
            .execute("CREATE INDEX \"su.lev0_shadow_recnum\" ON dummy (x)")
            .unwrap();

        let mgr = manager(true, SyncMode::Trigger);
        assert!(mgr.create(&store, &series, None).is_err());
        assert_eq!(series.shadow_state(), ShadowState::Unknown);
        assert!(!store.relation_exists("su.lev0_shadow").unwrap());
    }

    #[test]
    fn test_drop_removes_triggers() {
        let (store, series) = setup();
        let mgr = manager(true, SyncMode::Trigger);
        mgr.create(&store, &series, None).unwrap();
        assert_eq!(
            store
                .query_i64("SELECT count(*) FROM sqlite_master WHERE type = 'trigger'")
                .unwrap(),
            Some(2)
        );

        assert!(mgr.drop(&store, &series, None).unwrap());
        assert_eq!(series.shadow_state(), ShadowState::Absent);
        assert_eq!(
            store
                .query_i64("SELECT count(*) FROM sqlite_master WHERE type = 'trigger'")
                .unwrap(),
            Some(0)
        );
        assert!(!mgr.drop(&store, &series, None).unwrap());
    }

    #[test]
    fn test_trigger_observed_not_configured() {
        let (store, series) = setup();
        manager(true, SyncMode::Application)
            .create(&store, &series, None)
            .unwrap();
        assert_eq!(series.sync_trigger(), Some(false));

        // A session configured for trigger sync sees no trigger on this index
        let other = manager(false, SyncMode::Trigger);
        series.set_sync_trigger(None);
        assert!(!other.synced_by_trigger(&store, &series).unwrap());

        store.execute("DROP TABLE \"su.lev0_shadow\"").unwrap();
        series.set_shadow_state(ShadowState::Unknown);
        series.set_sync_trigger(None);
        manager(true, SyncMode::Trigger)
            .create(&store, &series, None)
            .unwrap();
        series.set_sync_trigger(None);
        assert!(manager(false, SyncMode::Application)
            .synced_by_trigger(&store, &series)
            .unwrap());

        store.execute("DROP TRIGGER \"su.lev0_shadow_sync_del\"").unwrap();
        series.set_sync_trigger(None);
        let err = other.synced_by_trigger(&store, &series).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inconsistent);
    }

    #[test]
    fn test_audit_reports_drift() {
        let (store, series) = setup();
        let mgr = manager(true, SyncMode::Application);
        mgr.create(&store, &series, None).unwrap();

        // Application sync: raw statements bypass the shadow
        store
            .execute("INSERT INTO \"su.lev0\" (fsn, camera, quality) VALUES (3, 1, 0), (2, 2, 1)")
            .unwrap();
        store.execute("DELETE FROM \"su.lev0\" WHERE fsn = 2 AND camera = 1").unwrap();

        let report = mgr.audit(&store, &series).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.missing, vec![vec![Some("3".to_string()), Some("1".to_string())]]);
        assert_eq!(report.orphans, vec![vec![Some("2".to_string()), Some("1".to_string())]]);
        assert_eq!(report.stale.len(), 1);
        assert_eq!(report.stale[0].expected, (2, 7));
        assert_eq!(report.stale[0].actual, (1, 4));
    }
}
