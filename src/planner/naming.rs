//! Temporary relation names
//!
//! Staged plans create session-scoped temporary relations. Every name handed
//! out by one source is distinct; a counter source that runs out of names
//! fails with [`Error::Overflow`] rather than wrapping onto a live relation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supplies fresh temporary relation names
pub trait TempNameSource: Send {
    fn next_name(&mut self) -> Result<String>;
}

/// `<prefix><n>` for n = 0, 1, 2, ... up to a limit
#[derive(Debug, Clone)]
pub struct MonotonicNames {
    prefix: String,
    next: u64,
    limit: u64,
}

impl MonotonicNames {
    pub fn new(prefix: impl Into<String>, limit: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
            limit,
        }
    }

    /// Start counting at `next`
    pub fn starting_at(mut self, next: u64) -> Self {
        self.next = next;
        self
    }

    /// Names handed out so far
    pub fn issued(&self) -> u64 {
        self.next
    }
}

impl TempNameSource for MonotonicNames {
    fn next_name(&mut self) -> Result<String> {
        if self.next >= self.limit {
            return Err(Error::Overflow(self.limit));
        }
        let name = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        Ok(name)
    }
}

/// `<prefix><uuid>` names; never exhausted
#[derive(Debug, Clone)]
pub struct UuidNames {
    prefix: String,
}

impl UuidNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl TempNameSource for UuidNames {
    fn next_name(&mut self) -> Result<String> {
        Ok(format!("{}{}", self.prefix, Uuid::new_v4().simple()))
    }
}

/// Configured naming scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameScheme {
    #[default]
    Counter,
    Uuid,
}

impl NameScheme {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "counter" | "monotonic" => Some(NameScheme::Counter),
            "uuid" => Some(NameScheme::Uuid),
            _ => None,
        }
    }

    /// A fresh source for this scheme
    pub fn source(&self, prefix: &str, counter_limit: u64) -> Box<dyn TempNameSource> {
        match self {
            NameScheme::Counter => Box::new(MonotonicNames::new(prefix, counter_limit)),
            NameScheme::Uuid => Box::new(UuidNames::new(prefix)),
        }
    }
}
