//! Schema catalog
//!
//! Series metadata keyed by lower-cased name. Entries are loaded from the
//! store's seed tables and shared as `Arc<Series>`; reloading a series
//! replaces its entry, so callers holding the old `Arc` keep a consistent view.

use super::series::{Attribute, Series, ShadowState};
use crate::error::{Error, Result};
use crate::store::{RelationalStore, StoreError, TextRow};
use crate::value::{quote_text, ValueType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Seed table of series names and their primary keys
pub const CATALOG_TABLE: &str = "series_catalog";

/// Seed table of series keywords
pub const KEYWORD_TABLE: &str = "series_keyword";

/// Seed tables, created on first use
pub(crate) const SEED_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS series_catalog (
        seriesname TEXT PRIMARY KEY,
        primary_idx TEXT NOT NULL,
        description TEXT
    );
    CREATE TABLE IF NOT EXISTS series_keyword (
        seriesname TEXT NOT NULL,
        keywordname TEXT NOT NULL,
        type TEXT NOT NULL,
        unit TEXT,
        rank INTEGER NOT NULL,
        PRIMARY KEY (seriesname, keywordname)
    );
";

/// In-memory catalog of series metadata
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    series: RwLock<HashMap<String, Arc<Series>>>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn text(row: &TextRow, i: usize) -> Option<&str> {
    row.get(i).and_then(|c| c.as_deref())
}

fn expect_width(rows: &[TextRow], width: usize) -> Result<()> {
    match rows.iter().find(|r| r.len() != width) {
        Some(row) => Err(StoreError::BadFieldCount {
            expected: width,
            actual: row.len(),
        }
        .into()),
        None => Ok(()),
    }
}

impl SchemaCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the seed tables if they do not exist
    pub fn ensure_seed_tables<S: RelationalStore + ?Sized>(store: &S) -> Result<()> {
        store.execute_batch(SEED_SCHEMA)?;
        Ok(())
    }

    /// Load every series from the seed tables
    pub fn load<S: RelationalStore + ?Sized>(store: &S) -> Result<Self> {
        Self::ensure_seed_tables(store)?;
        let catalog = Self::new();

        let rows = store.query_text(&format!(
            "SELECT seriesname, primary_idx, description FROM {} ORDER BY seriesname",
            CATALOG_TABLE
        ))?;
        expect_width(&rows, 3)?;

        let keywords = store.query_text(&format!(
            "SELECT seriesname, keywordname, type, unit, rank FROM {} ORDER BY seriesname, rank",
            KEYWORD_TABLE
        ))?;
        expect_width(&keywords, 5)?;

        let mut by_series: HashMap<String, Vec<Attribute>> = HashMap::new();
        for row in &keywords {
            let (series, attr) = Self::attribute_from_row(row)?;
            by_series.entry(series).or_default().push(attr);
        }

        for row in &rows {
            let name = key(text(row, 0).unwrap_or_default());
            let attrs = by_series.remove(&name).unwrap_or_default();
            catalog.upsert(Self::series_from_row(row, attrs)?);
        }

        debug!("Loaded {} series from catalog", catalog.len());
        Ok(catalog)
    }

    /// Reload one series from the seed tables; its shadow state resets to unknown
    pub fn refresh<S: RelationalStore + ?Sized>(&self, store: &S, name: &str) -> Result<Arc<Series>> {
        let name = key(name);
        let rows = store.query_text(&format!(
            "SELECT seriesname, primary_idx, description FROM {} WHERE lower(seriesname) = {}",
            CATALOG_TABLE,
            quote_text(&name)
        ))?;
        expect_width(&rows, 3)?;
        let row = rows.first().ok_or_else(|| Error::UnknownSeries(name.clone()))?;

        let keywords = store.query_text(&format!(
            "SELECT seriesname, keywordname, type, unit, rank FROM {} \
             WHERE lower(seriesname) = {} ORDER BY rank",
            KEYWORD_TABLE,
            quote_text(&name)
        ))?;
        expect_width(&keywords, 5)?;
        let attrs = keywords
            .iter()
            .map(|r| Self::attribute_from_row(r).map(|(_, a)| a))
            .collect::<Result<Vec<_>>>()?;

        let series = Self::series_from_row(row, attrs)?;
        debug!("Refreshed series {}", series.name());
        Ok(self.upsert(series))
    }

    /// Write a series' seed rows
    pub fn persist<S: RelationalStore + ?Sized>(store: &S, series: &Series) -> Result<()> {
        store.execute(&format!(
            "INSERT INTO {} (seriesname, primary_idx, description) VALUES ({}, {}, {})",
            CATALOG_TABLE,
            quote_text(series.name()),
            quote_text(&series.primary_keys().join(",")),
            quote_text(series.description())
        ))?;
        for attr in series.attributes() {
            let unit = attr
                .unit
                .as_deref()
                .map(quote_text)
                .unwrap_or_else(|| "NULL".to_string());
            store.execute(&format!(
                "INSERT INTO {} (seriesname, keywordname, type, unit, rank) VALUES ({}, {}, {}, {}, {})",
                KEYWORD_TABLE,
                quote_text(series.name()),
                quote_text(&attr.name),
                quote_text(attr.ty.name()),
                unit,
                attr.rank
            ))?;
        }
        Ok(())
    }

    fn attribute_from_row(row: &TextRow) -> Result<(String, Attribute)> {
        let series = key(text(row, 0).unwrap_or_default());
        let name = text(row, 1).unwrap_or_default();
        let ty_name = text(row, 2).unwrap_or_default();
        let ty = ValueType::from_name(ty_name).ok_or_else(|| {
            Error::InvalidDefinition(format!("keyword {} of {} has unknown type '{}'", name, series, ty_name))
        })?;
        let mut attr = Attribute::new(name, ty);
        attr.unit = text(row, 3).map(str::to_string);
        attr.rank = text(row, 4).and_then(|r| r.parse().ok()).unwrap_or(0);
        Ok((series, attr))
    }

    fn series_from_row(row: &TextRow, attrs: Vec<Attribute>) -> Result<Series> {
        let name = text(row, 0).unwrap_or_default();
        let primary: Vec<String> = text(row, 1)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let description = text(row, 2).unwrap_or_default();
        Series::new(name, description, attrs, &primary)
    }

    /// Insert or replace a series, returning the stored entry
    pub fn upsert(&self, series: Series) -> Arc<Series> {
        let series = Arc::new(series);
        self.series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(series.name()), Arc::clone(&series));
        series
    }

    /// Remove a series from the catalog
    pub fn remove(&self, name: &str) -> Option<Arc<Series>> {
        self.series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key(name))
    }

    /// Look up a series
    pub fn get(&self, name: &str) -> Result<Arc<Series>> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(name))
            .cloned()
            .ok_or_else(|| Error::UnknownSeries(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key(name))
    }

    /// Series names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.series.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered primary-key attribute names of a series
    pub fn primary_keys(&self, series: &str) -> Result<Vec<String>> {
        Ok(self.get(series)?.primary_keys().to_vec())
    }

    /// Type of one attribute of a series
    pub fn attribute_type(&self, series: &str, attribute: &str) -> Result<ValueType> {
        self.get(series)?.attribute_type(attribute)
    }

    /// Cached shadow state of a series
    pub fn shadow_flag(&self, series: &str) -> Result<ShadowState> {
        Ok(self.get(series)?.shadow_state())
    }

    /// Record whether a series has a shadow index
    pub fn set_shadow_flag(&self, series: &str, present: bool) -> Result<()> {
        self.get(series)?
            .set_shadow_state(ShadowState::from_flag(present));
        Ok(())
    }
}
