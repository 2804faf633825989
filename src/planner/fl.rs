//! First/last candidate chain
//!
//! Directives are applied one primary-key attribute at a time, in key order.
//! Each step narrows the running candidate set, starting from the shadow
//! index, into a new temporary relation:
//!
//! ```text
//! step(a, LAST, C):  CREATE TEMPORARY TABLE tmp_k AS
//!                    SELECT S.* FROM prev AS S
//!                    WHERE C AND S.a = (SELECT max(S.a) FROM prev AS S WHERE C)
//! ```
//!
//! `C` is the conjunction of primary-key filter conjuncts whose highest-ranked
//! attribute is `a`. Attributes with neither a directive nor a conjunct get no
//! step. The last relation in the chain holds the candidate shadow rows.

use super::naming::TempNameSource;
use super::request::Extremum;
use super::SHADOW_ALIAS;
use crate::catalog::Series;
use crate::error::Result;
use crate::sql::predicate::{qualify, referenced_columns, split_conjuncts};
use crate::sql::{Expr, Relation, Select, Source, Statement};
use std::collections::BTreeMap;
use tracing::debug;

/// One narrowing step of the chain
#[derive(Debug, Clone, PartialEq)]
pub struct FlStep {
    pub attribute: String,
    pub directive: Option<Extremum>,
    pub conjuncts: Vec<String>,
}

/// Built chain: setup statements and the final candidate relation
#[derive(Debug, Clone, PartialEq)]
pub struct FlChain {
    pub steps: Vec<FlStep>,
    pub setup: Vec<Statement>,
    pub temps: Vec<String>,
    pub candidates: Relation,
}

/// Plans the first/last candidate chain of a request
pub struct InnerFLSelect<'a> {
    series: &'a Series,
    shadow: Relation,
}

impl<'a> InnerFLSelect<'a> {
    pub fn new(series: &'a Series, shadow: Relation) -> Self {
        Self { series, shadow }
    }

    /// Assign conjuncts and directives to primary-key attributes, in key order
    pub fn steps(
        &self,
        pk_predicate: Option<&str>,
        directives: &BTreeMap<String, Extremum>,
    ) -> Result<Vec<FlStep>> {
        let keys = self.series.primary_keys();
        let mut assigned: Vec<Vec<String>> = vec![Vec::new(); keys.len()];

        if let Some(predicate) = pk_predicate {
            for conjunct in split_conjuncts(predicate)? {
                let referenced = referenced_columns(&conjunct, keys)?;
                let slot = keys
                    .iter()
                    .rposition(|k| referenced.contains(k))
                    .unwrap_or(0);
                assigned[slot].push(conjunct);
            }
        }

        Ok(keys
            .iter()
            .zip(assigned)
            .filter_map(|(key, conjuncts)| {
                let directive = directives.get(key).copied();
                if directive.is_none() && conjuncts.is_empty() {
                    return None;
                }
                Some(FlStep {
                    attribute: key.clone(),
                    directive,
                    conjuncts,
                })
            })
            .collect())
    }

    /// Build the chain of temporary relations
    pub fn build(
        &self,
        pk_predicate: Option<&str>,
        directives: &BTreeMap<String, Extremum>,
        names: &mut dyn TempNameSource,
    ) -> Result<FlChain> {
        let steps = self.steps(pk_predicate, directives)?;
        let keys = self.series.primary_keys();

        let mut setup = Vec::with_capacity(steps.len());
        let mut temps = Vec::with_capacity(steps.len());
        let mut prev = self.shadow.clone();

        for step in &steps {
            let mut qualified = Vec::with_capacity(step.conjuncts.len());
            for conjunct in &step.conjuncts {
                qualified.push(Expr::raw(qualify(conjunct, SHADOW_ALIAS, keys)?));
            }
            let condition = Expr::all(qualified);

            let narrowing = step.directive.map(|which| {
                let column = Expr::qcol(SHADOW_ALIAS, step.attribute.as_str());
                let extreme = match which {
                    Extremum::First => Expr::min(column.clone()),
                    Extremum::Last => Expr::max(column.clone()),
                };
                let inner = Select::new(vec![extreme])
                    .from(Source::aliased(prev.clone(), SHADOW_ALIAS))
                    .filter(condition.clone());
                Expr::eq(column, Expr::subquery(inner))
            });

            let name = names.next_name()?;
            setup.push(Statement::CreateTempAs {
                name: name.clone(),
                query: Select::new(vec![Expr::Star(Some(SHADOW_ALIAS.to_string()))])
                    .from(Source::aliased(prev, SHADOW_ALIAS))
                    .filter(condition)
                    .filter(narrowing),
            });
            debug!(
                "First/last step on {} ({:?}, {} conjuncts) -> {}",
                step.attribute,
                step.directive,
                step.conjuncts.len(),
                name
            );
            prev = Relation::temp(name.clone());
            temps.push(name);
        }

        Ok(FlChain {
            steps,
            setup,
            temps,
            candidates: prev,
        })
    }
}
