//! Query Planner
//!
//! Answers count and select requests from a series' shadow index instead of
//! aggregating the primary table.
//!
//! # Architecture
//!
//! ```text
//! QueryRequest ──► Strategy::choose ──► PlanBuilder ──► QueryPlan ──► QueryExecutor
//!                  (shape × access)      (+ InnerFLSelect)  (setup + terminal)
//! ```
//!
//! Aliases are fixed: the primary table is always `T` and the shadow index
//! (or the current candidate relation) is always `S`.

mod executor;
mod fl;
mod naming;
mod plan;
mod request;
mod strategy;

pub use executor::{QueryExecutor, QueryResult};
pub use fl::{FlChain, FlStep, InnerFLSelect};
pub use naming::{MonotonicNames, NameScheme, TempNameSource, UuidNames};
pub use plan::{PlanSummary, QueryPlan};
pub use request::{Extremum, Projection, QueryRequest};
pub use strategy::{Access, FilterShape, Strategy};

use crate::catalog::Series;
use crate::config::PlannerConfig;
use crate::error::Result;
use crate::sql::Relation;
use plan::PlanBuilder;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Alias of the primary table in planned statements
pub const PRIMARY_ALIAS: &str = "T";

/// Alias of the shadow index or candidate relation in planned statements
pub const SHADOW_ALIAS: &str = "S";

/// Plans requests for one session
///
/// Owns the session's temporary-name source, so every plan it builds uses
/// names no earlier plan in the session used.
pub struct QueryPlanner {
    suffix: String,
    stage_threshold: u64,
    names: Mutex<Box<dyn TempNameSource>>,
}

impl QueryPlanner {
    /// Create a planner from configuration
    pub fn new(config: &PlannerConfig, suffix: impl Into<String>) -> Self {
        Self::with_names(
            suffix,
            config.stage_threshold,
            config.names.source(&config.temp_prefix, config.counter_limit),
        )
    }

    /// Create a planner with an explicit name source
    pub fn with_names(
        suffix: impl Into<String>,
        stage_threshold: u64,
        names: Box<dyn TempNameSource>,
    ) -> Self {
        Self {
            suffix: suffix.into(),
            stage_threshold,
            names: Mutex::new(names),
        }
    }

    pub fn stage_threshold(&self) -> u64 {
        self.stage_threshold
    }

    /// Build the plan answering `request`
    ///
    /// The series must have a shadow index; the planner does not probe for it.
    pub fn plan(&self, series: &Series, request: &QueryRequest) -> Result<QueryPlan> {
        request.validate(series)?;
        let strategy = Strategy::choose(request, self.stage_threshold);
        let shadow = Relation::named(series.shadow_name(&self.suffix));

        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        let plan = PlanBuilder::new(series, request, strategy, shadow)?.build(names.as_mut())?;

        info!(
            "Planned {} request on {}: {} ({} temporary relations)",
            if request.is_count() { "count" } else { "select" },
            series.name(),
            strategy,
            plan.temps.len()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Attribute;
    use crate::error::ErrorKind;
    use crate::value::ValueType;

    fn series() -> Series {
        Series::new(
            "a.b",
            "",
            vec![
                Attribute::new("t_rec", ValueType::Time),
                Attribute::new("quality", ValueType::Int),
            ],
            &["t_rec".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_names_advance_across_plans() {
        let planner = QueryPlanner::new(&PlannerConfig::default(), "_shadow");
        let s = series();
        let first = planner.plan(&s, &QueryRequest::select(&[])).unwrap();
        let second = planner.plan(&s, &QueryRequest::select(&[])).unwrap();
        assert_eq!(first.temps, vec!["shadowtmp0"]);
        assert_eq!(second.temps, vec!["shadowtmp1"]);
    }

    #[test]
    fn test_exhausted_names_overflow() {
        let planner = QueryPlanner::with_names("_shadow", 10, Box::new(MonotonicNames::new("t", 1)));
        let s = series();
        planner.plan(&s, &QueryRequest::select(&[])).unwrap();
        let err = planner.plan(&s, &QueryRequest::select(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);

        // Direct plans need no names
        assert!(planner.plan(&s, &QueryRequest::select(&[]).limit(5)).is_ok());
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let planner = QueryPlanner::new(&PlannerConfig::default(), "_shadow");
        let err = planner
            .plan(&series(), &QueryRequest::select(&["missing"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAttribute);
    }
}
