//! Shadow index maintenance
//!
//! A shadow index holds one row per record group of a series: the group's
//! primary-key tuple, its version count and its current row identifier.
//! [`ShadowIndexManager`] builds and removes it; [`GroupVersionResolver`] and
//! the trigger program in [`trigger`] keep it in step with the primary table.

mod gate;
mod grants;
mod manager;
mod resolver;
pub mod trigger;

pub use gate::CreationGate;
pub use grants::{grant_statements, parse_acl, privilege_name};
pub use manager::{AuditReport, CreateOutcome, ShadowIndexManager, StaleRow};
pub use resolver::{DeleteTransition, GroupVersionResolver, InsertTransition};

pub(crate) use resolver::tuple_filter;

use serde::{Deserialize, Serialize};

/// How shadow rows follow primary-table mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Store-side triggers on the primary table
    #[default]
    Trigger,
    /// The record writer runs the resolver in its own transaction
    Application,
}

impl SyncMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trigger" => Some(SyncMode::Trigger),
            "application" | "app" => Some(SyncMode::Application),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Trigger => write!(f, "trigger"),
            SyncMode::Application => write!(f, "application"),
        }
    }
}
