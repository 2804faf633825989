//! Series definitions and creation
//!
//! A definition is the JSON form of a new series:
//!
//! ```json
//! {
//!   "name": "hmi.m_45s",
//!   "description": "Line-of-sight magnetograms",
//!   "attributes": [
//!     { "name": "t_rec", "type": "time", "unit": "TAI" },
//!     { "name": "camera", "type": "int" },
//!     { "name": "datamean", "type": "double" }
//!   ],
//!   "primary_key": ["t_rec", "camera"],
//!   "create_shadow": true
//! }
//! ```

use super::schema::SchemaCatalog;
use super::series::{Attribute, Series, ShadowState, RECNUM};
use crate::error::{Error, Result};
use crate::sql::{ColumnDef, ColumnType, Statement};
use crate::store::{in_transaction, RelationalStore};
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One keyword of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A new series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub attributes: Vec<AttributeDef>,
    pub primary_key: Vec<String>,
    /// Build the shadow index right after the series
    #[serde(default)]
    pub create_shadow: bool,
}

impl SeriesDefinition {
    /// Parse a definition from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidDefinition(e.to_string()))
    }

    /// Validate and build the series metadata
    pub fn to_series(&self) -> Result<Series> {
        if self.attributes.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "series {} declares no keywords",
                self.name
            )));
        }
        let attributes = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, def)| Attribute {
                name: def.name.trim().to_lowercase(),
                ty: def.ty,
                unit: def.unit.clone(),
                rank: i as u32 + 1,
            })
            .collect();
        Series::new(&self.name, &self.description, attributes, &self.primary_key)
    }
}

/// Name of the composite primary-key index on a primary table
pub fn primary_index_name(series: &Series) -> String {
    format!("{}_pkidx", series.name())
}

/// Create a series: its primary table, a primary-key index and its catalog rows
///
/// The shadow index is not built here; callers holding the creation gate do
/// that afterwards when the definition asks for it.
pub fn create_series<S: RelationalStore + ?Sized>(
    store: &S,
    catalog: &SchemaCatalog,
    definition: &SeriesDefinition,
) -> Result<Arc<Series>> {
    let series = definition.to_series()?;
    SchemaCatalog::ensure_seed_tables(store)?;

    if catalog.contains(series.name()) || store.relation_exists(series.name())? {
        return Err(Error::InvalidDefinition(format!(
            "series {} already exists",
            series.name()
        )));
    }

    let dialect = store.dialect();
    let mut columns = vec![ColumnDef::new(RECNUM, ColumnType::RecordNumber { auto: true })];
    columns.extend(
        series
            .attributes()
            .iter()
            .map(|a| ColumnDef::new(a.name.clone(), ColumnType::Value(a.ty))),
    );
    let create = dialect.render(&Statement::CreateTable {
        relation: series.relation(),
        columns,
        primary_key: Vec::new(),
    })?;
    let index = dialect.render(&Statement::CreateIndex {
        name: primary_index_name(&series),
        relation: series.relation(),
        columns: series.primary_keys().to_vec(),
    })?;

    in_transaction(store, || {
        store.execute(&create)?;
        store.execute(&index)?;
        SchemaCatalog::persist(store, &series)
    })?;

    // A new series has no shadow index yet
    series.set_shadow_state(ShadowState::Absent);
    info!(
        "Created series {} with primary key ({})",
        series.name(),
        series.primary_keys().join(", ")
    );
    Ok(catalog.upsert(series))
}
