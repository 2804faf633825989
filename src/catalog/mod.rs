//! Schema Catalog
//!
//! Per-series metadata: the ordered primary-key tuple, keyword types and the
//! cached shadow-index state.
//!
//! # Seed tables
//!
//! ```text
//! series_catalog (seriesname, primary_idx, description)
//! series_keyword (seriesname, keywordname, type, unit, rank)
//! ```
//!
//! `primary_idx` is the comma-separated primary-key list in key order.

mod definition;
mod schema;
mod series;

pub use definition::{create_series, primary_index_name, AttributeDef, SeriesDefinition};
pub use schema::{SchemaCatalog, CATALOG_TABLE, KEYWORD_TABLE};
pub use series::{Attribute, Series, ShadowState, NRECORDS, RECNUM};
