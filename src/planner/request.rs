//! Query requests
//!
//! A request names what to return (columns or a count), how to filter it and
//! how many rows to return. Requests are built fluently:
//!
//! ```text
//! QueryRequest::select(&["t_rec", "datamean"])
//!     .pk_filter("t_rec > 100")
//!     .npk_filter("quality = 0")
//!     .last("t_rec")
//!     .limit(20)
//! ```

use crate::catalog::{Series, NRECORDS, RECNUM};
use crate::error::{Error, Result};
use crate::sql::predicate::referenced_columns;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// First/last selection on one primary-key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extremum {
    /// Smallest value
    First,
    /// Largest value
    Last,
}

impl Extremum {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" | "^" | "min" => Some(Extremum::First),
            "last" | "$" | "max" => Some(Extremum::Last),
            _ => None,
        }
    }
}

/// What a request returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Named columns of the primary table; empty means every column
    Columns(Vec<String>),
    /// Number of matching current versions
    Count,
}

/// A count or select request against one series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub projection: Projection,
    /// Predicate over primary-key attributes only
    #[serde(default)]
    pub pk_predicate: Option<String>,
    /// Predicate over any other attributes
    #[serde(default)]
    pub npk_predicate: Option<String>,
    #[serde(default)]
    pub first_last: BTreeMap<String, Extremum>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Cap from a "top N" or "last N" request
    #[serde(default)]
    pub top_n: Option<u64>,
    /// Invert the primary-key ordering ("last N")
    #[serde(default)]
    pub descending: bool,
    /// Deliver rows through a cursor instead of one result set
    #[serde(default)]
    pub streaming: bool,
}

impl QueryRequest {
    /// Select the named columns; no names selects every column
    pub fn select(columns: &[&str]) -> Self {
        Self::new(Projection::Columns(
            columns.iter().map(|c| c.trim().to_lowercase()).collect(),
        ))
    }

    /// Count current versions
    pub fn count() -> Self {
        Self::new(Projection::Count)
    }

    fn new(projection: Projection) -> Self {
        Self {
            projection,
            pk_predicate: None,
            npk_predicate: None,
            first_last: BTreeMap::new(),
            limit: None,
            top_n: None,
            descending: false,
            streaming: false,
        }
    }

    pub fn pk_filter(mut self, predicate: impl Into<String>) -> Self {
        self.pk_predicate = non_blank(predicate.into());
        self
    }

    pub fn npk_filter(mut self, predicate: impl Into<String>) -> Self {
        self.npk_predicate = non_blank(predicate.into());
        self
    }

    pub fn first(self, attribute: &str) -> Self {
        self.extremum(attribute, Extremum::First)
    }

    pub fn last(self, attribute: &str) -> Self {
        self.extremum(attribute, Extremum::Last)
    }

    pub fn extremum(mut self, attribute: &str, which: Extremum) -> Self {
        self.first_last.insert(attribute.trim().to_lowercase(), which);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// First `n` groups in primary-key order
    pub fn top(mut self, n: u64) -> Self {
        self.top_n = Some(n);
        self.descending = false;
        self
    }

    /// Last `n` groups, returned in descending primary-key order
    pub fn last_n(mut self, n: u64) -> Self {
        self.top_n = Some(n);
        self.descending = true;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn is_count(&self) -> bool {
        self.projection == Projection::Count
    }

    /// Smaller of the limit and the top-N cap; `None` is unbounded
    pub fn effective_limit(&self) -> Option<u64> {
        match (self.limit, self.top_n) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Check attribute names against a series
    ///
    /// A primary-key filter may be answered from the shadow index alone, so
    /// it must not name any other column.
    pub fn validate(&self, series: &Series) -> Result<()> {
        if let Some(predicate) = &self.pk_predicate {
            let mut columns = series.column_names();
            columns.push(RECNUM.to_string());
            columns.push(NRECORDS.to_string());
            let foreign = referenced_columns(predicate, &columns)?
                .into_iter()
                .find(|column| column == RECNUM || column == NRECORDS || !series.is_primary(column));
            if let Some(column) = foreign {
                return Err(Error::InvalidRequest(format!(
                    "primary-key filter on {} references {} which is not a primary-key attribute",
                    series.name(),
                    column
                )));
            }
        }
        for attribute in self.first_last.keys() {
            if series.attribute(attribute).is_none() {
                return Err(Error::UnknownAttribute {
                    series: series.name().to_string(),
                    attribute: attribute.clone(),
                });
            }
            if !series.is_primary(attribute) {
                return Err(Error::InvalidRequest(format!(
                    "first/last selection on {} which is not a primary-key attribute of {}",
                    attribute,
                    series.name()
                )));
            }
        }
        if let Projection::Columns(columns) = &self.projection {
            for column in columns {
                if column != RECNUM && series.attribute(column).is_none() {
                    return Err(Error::UnknownAttribute {
                        series: series.name().to_string(),
                        attribute: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
