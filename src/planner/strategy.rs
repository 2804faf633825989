//! Strategy selection
//!
//! ```text
//!                  no non-pk filter     non-pk filter
//! no pk filter     Unfiltered           NonPrimaryOnly
//! pk filter        PrimaryOnly          Both
//! ```
//!
//! Each shape is answered either by joining the primary table to its shadow
//! index directly or by staging shadow row identifiers in a temporary
//! relation first. Staging pays off for large batch reads; cursors and small
//! limits stay direct. First/last requests always go through the chained
//! candidate relations.

use super::request::QueryRequest;
use serde::Serialize;
use std::fmt;

/// Which predicates a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterShape {
    Unfiltered,
    NonPrimaryOnly,
    PrimaryOnly,
    Both,
}

impl FilterShape {
    pub fn of(request: &QueryRequest) -> Self {
        match (request.pk_predicate.is_some(), request.npk_predicate.is_some()) {
            (false, false) => FilterShape::Unfiltered,
            (false, true) => FilterShape::NonPrimaryOnly,
            (true, false) => FilterShape::PrimaryOnly,
            (true, true) => FilterShape::Both,
        }
    }

    pub fn has_pk(&self) -> bool {
        matches!(self, FilterShape::PrimaryOnly | FilterShape::Both)
    }

    pub fn has_npk(&self) -> bool {
        matches!(self, FilterShape::NonPrimaryOnly | FilterShape::Both)
    }
}

/// How the shadow index is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// `JOIN ... ON T.recnum = S.recnum` in the terminal statement
    DirectJoin,
    /// Row identifiers collected in a temporary relation first
    Staged,
    /// First/last candidate chain
    FirstLastChain,
}

/// A chosen plan shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Strategy {
    pub shape: FilterShape,
    pub access: Access,
}

impl Strategy {
    /// Pick the strategy for a request
    pub fn choose(request: &QueryRequest, stage_threshold: u64) -> Self {
        let shape = FilterShape::of(request);
        let access = if !request.first_last.is_empty() {
            Access::FirstLastChain
        } else if request.is_count() || request.streaming {
            Access::DirectJoin
        } else {
            match request.effective_limit() {
                Some(n) if n <= stage_threshold => Access::DirectJoin,
                _ => Access::Staged,
            }
        };
        Self { shape, access }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.shape, self.access)
    }
}
