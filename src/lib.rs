//! # shadowtab
//!
//! Shadow-index maintenance and query planning for versioned record series
//! kept in a relational store.
//!
//! A series is a table of immutable records keyed by an ordered primary-key
//! tuple; rows sharing a tuple are versions, and the one with the greatest
//! row identifier is current. Counting or selecting current versions over a
//! large table means aggregating it, so each series carries a shadow index:
//! one row per tuple with the version count and current row identifier.
//!
//! ## Modules
//!
//! - [`value`]: typed scalar values, literal parsing/formatting and conversion
//! - [`catalog`]: series metadata, seed tables and series creation
//! - [`store`]: the relational store interface and its SQLite implementation
//! - [`sql`]: statement AST, dialect rendering and predicate rewriting
//! - [`shadow`]: shadow index creation, synchronization and audit
//! - [`planner`]: request planning and execution against the shadow index
//! - [`records`]: record insertion, deletion and batches
//! - [`session`]: one connection with everything built on it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shadowtab::records::Record;
//! use shadowtab::value::Value;
//! use shadowtab::{Config, QueryRequest, SeriesDefinition, Session};
//!
//! fn main() -> shadowtab::Result<()> {
//!     let session = Session::open(&Config::load_default())?;
//!     session.enable_shadow_creation(true);
//!
//!     session.create_series(&SeriesDefinition::from_json(
//!         r#"{"name": "su.demo",
//!             "attributes": [{"name": "fsn", "type": "int"}, {"name": "q", "type": "int"}],
//!             "primary_key": ["fsn"], "create_shadow": true}"#,
//!     )?)?;
//!
//!     session.insert("su.demo", &Record::new().set("fsn", Value::Int(1)).set("q", Value::Int(0)))?;
//!     let latest = session.select("su.demo", &QueryRequest::select(&[]).last("fsn"))?;
//!     println!("{} current rows", latest.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod planner;
pub mod records;
pub mod session;
pub mod shadow;
pub mod sql;
pub mod store;
pub mod value;

pub use catalog::{SchemaCatalog, Series, SeriesDefinition, ShadowState};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use planner::{QueryPlan, QueryPlanner, QueryRequest, QueryResult};
pub use session::Session;
pub use shadow::{CreationGate, ShadowIndexManager, SyncMode};
pub use store::{RelationalStore, SqliteStore};
