//! Plan construction
//!
//! A [`QueryPlan`] is the statement sequence answering one request: setup
//! statements creating temporary relations, then one terminal statement.
//!
//! ```text
//! direct   SELECT T.cols FROM series AS T JOIN shadow AS S ON T.recnum = S.recnum
//!          WHERE npk(T) AND pk(S) ORDER BY S.pk LIMIT n
//!
//! staged   CREATE TEMPORARY TABLE tmp AS SELECT S.recnum FROM shadow AS S WHERE pk(S) ...
//!          SELECT T.cols FROM series AS T WHERE T.recnum IN (SELECT recnum FROM tmp)
//!          ... ORDER BY T.pk LIMIT n
//! ```

use super::fl::{FlChain, InnerFLSelect};
use super::naming::TempNameSource;
use super::request::{Projection, QueryRequest};
use super::strategy::{Access, FilterShape, Strategy};
use super::{PRIMARY_ALIAS, SHADOW_ALIAS};
use crate::catalog::{Series, RECNUM};
use crate::error::Result;
use crate::sql::predicate::qualify;
use crate::sql::{Dialect, Expr, OrderItem, Relation, Select, Source, Statement};
use crate::store::StatementBatch;
use serde::Serialize;

/// Statements answering one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub series: String,
    pub strategy: Strategy,
    pub setup: Vec<Statement>,
    pub terminal: Statement,
    /// Temporary relations created by `setup`
    pub temps: Vec<String>,
    /// Result column names; a single `count` for count requests
    pub columns: Vec<String>,
    pub streaming: bool,
}

/// Rendered plan, as shown by explain
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub series: String,
    pub strategy: Strategy,
    pub temps: Vec<String>,
    pub statements: Vec<String>,
}

impl QueryPlan {
    /// Render every statement for a dialect
    pub fn render(&self, dialect: Dialect) -> Result<StatementBatch> {
        let setup = self
            .setup
            .iter()
            .map(|s| dialect.render(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(StatementBatch {
            setup,
            terminal: dialect.render(&self.terminal)?,
        })
    }

    /// Rendered batch joined by the separator marker
    pub fn explain(&self, dialect: Dialect) -> Result<String> {
        Ok(self.render(dialect)?.render())
    }

    pub fn summary(&self, dialect: Dialect) -> Result<PlanSummary> {
        let batch = self.render(dialect)?;
        let mut statements = batch.setup;
        statements.push(batch.terminal);
        Ok(PlanSummary {
            series: self.series.clone(),
            strategy: self.strategy,
            temps: self.temps.clone(),
            statements,
        })
    }

    /// Statements dropping this plan's temporary relations
    pub fn cleanup(&self) -> Vec<Statement> {
        self.temps
            .iter()
            .rev()
            .map(|name| Statement::DropTable {
                relation: Relation::temp(name.clone()),
                if_exists: true,
            })
            .collect()
    }

    pub fn is_count(&self) -> bool {
        matches!(&self.terminal, Statement::Select(s) if s.columns == [Expr::CountStar])
    }
}

/// Builds the plan for one request against one series
pub(crate) struct PlanBuilder<'a> {
    series: &'a Series,
    request: &'a QueryRequest,
    strategy: Strategy,
    shadow: Relation,
    pk: Option<Expr>,
    npk: Option<Expr>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        series: &'a Series,
        request: &'a QueryRequest,
        strategy: Strategy,
        shadow: Relation,
    ) -> Result<Self> {
        let pk = match &request.pk_predicate {
            Some(p) => Some(Expr::raw(qualify(p, SHADOW_ALIAS, series.primary_keys())?)),
            None => None,
        };
        let npk = match &request.npk_predicate {
            Some(p) => {
                let mut columns = series.column_names();
                columns.push(RECNUM.to_string());
                Some(Expr::raw(qualify(p, PRIMARY_ALIAS, &columns)?))
            }
            None => None,
        };
        Ok(Self {
            series,
            request,
            strategy,
            shadow,
            pk,
            npk,
        })
    }

    pub fn build(self, names: &mut dyn TempNameSource) -> Result<QueryPlan> {
        let (setup, temps, terminal) = match self.strategy.access {
            Access::FirstLastChain => {
                let chain = InnerFLSelect::new(self.series, self.shadow.clone()).build(
                    self.request.pk_predicate.as_deref(),
                    &self.request.first_last,
                    names,
                )?;
                let FlChain {
                    setup,
                    temps,
                    candidates,
                    ..
                } = chain;
                // The chain already applied the primary-key filter
                let terminal = if self.request.is_count() {
                    self.count_over(candidates, None)
                } else {
                    self.direct_over(candidates, None)
                };
                (setup, temps, terminal)
            }
            Access::DirectJoin if self.request.is_count() => {
                (Vec::new(), Vec::new(), self.count_over(self.shadow.clone(), self.pk.clone()))
            }
            Access::DirectJoin => (
                Vec::new(),
                Vec::new(),
                self.direct_over(self.shadow.clone(), self.pk.clone()),
            ),
            Access::Staged => {
                let name = names.next_name()?;
                let (stage, terminal) = self.staged(&name);
                (vec![stage], vec![name], terminal)
            }
        };

        Ok(QueryPlan {
            series: self.series.name().to_string(),
            strategy: self.strategy,
            setup,
            terminal: Statement::Select(terminal),
            temps,
            columns: self.column_names(),
            streaming: self.request.streaming,
        })
    }

    fn column_names(&self) -> Vec<String> {
        match &self.request.projection {
            Projection::Count => vec!["count".to_string()],
            Projection::Columns(cols) if cols.is_empty() => {
                let mut all = vec![RECNUM.to_string()];
                all.extend(self.series.column_names());
                all
            }
            Projection::Columns(cols) => cols.clone(),
        }
    }

    fn projection(&self) -> Vec<Expr> {
        match &self.request.projection {
            Projection::Count => vec![Expr::CountStar],
            Projection::Columns(cols) if cols.is_empty() => {
                vec![Expr::Star(Some(PRIMARY_ALIAS.to_string()))]
            }
            Projection::Columns(cols) => cols
                .iter()
                .map(|c| Expr::qcol(PRIMARY_ALIAS, c.as_str()))
                .collect(),
        }
    }

    fn order(&self, alias: &str) -> Vec<OrderItem> {
        self.series
            .primary_keys()
            .iter()
            .map(|k| OrderItem {
                expr: Expr::qcol(alias, k.as_str()),
                descending: self.request.descending,
            })
            .collect()
    }

    fn primary_source(&self) -> Source {
        Source::aliased(self.series.relation(), PRIMARY_ALIAS)
    }

    fn recnum_join(&self) -> Expr {
        Expr::eq(
            Expr::qcol(PRIMARY_ALIAS, RECNUM),
            Expr::qcol(SHADOW_ALIAS, RECNUM),
        )
    }

    /// Primary table joined to `shadow`, both filters, ordered and limited
    fn direct_over(&self, shadow: Relation, pk: Option<Expr>) -> Select {
        Select::new(self.projection())
            .from(self.primary_source())
            .join(Source::aliased(shadow, SHADOW_ALIAS), self.recnum_join())
            .filter(self.npk.clone())
            .filter(pk)
            .order_by(self.order(SHADOW_ALIAS))
            .limit(self.request.effective_limit())
    }

    /// Count of current versions in `shadow`; joins only for a non-pk filter
    fn count_over(&self, shadow: Relation, pk: Option<Expr>) -> Select {
        let select = Select::new(vec![Expr::CountStar]);
        if self.npk.is_some() {
            select
                .from(self.primary_source())
                .join(Source::aliased(shadow, SHADOW_ALIAS), self.recnum_join())
                .filter(self.npk.clone())
                .filter(pk)
        } else {
            select.from(Source::aliased(shadow, SHADOW_ALIAS)).filter(pk)
        }
    }

    /// Stage surviving row identifiers in `name`, then read the primary table
    fn staged(&self, name: &str) -> (Statement, Select) {
        let limit = self.request.effective_limit();
        let recnum = vec![Expr::qcol(SHADOW_ALIAS, RECNUM)];
        let shadow = Source::aliased(self.shadow.clone(), SHADOW_ALIAS);

        let stage = match self.strategy.shape {
            FilterShape::Unfiltered | FilterShape::PrimaryOnly => Select::new(recnum)
                .from(shadow)
                .filter(self.pk.clone())
                .order_by(self.order(SHADOW_ALIAS))
                .limit(limit),
            // Non-pk filtering happens on the primary side below
            FilterShape::NonPrimaryOnly => Select::new(recnum).from(shadow),
            FilterShape::Both => Select::new(recnum)
                .from(self.primary_source())
                .join(shadow, self.recnum_join())
                .filter(self.npk.clone())
                .filter(self.pk.clone())
                .order_by(self.order(SHADOW_ALIAS))
                .limit(limit),
        };

        let members = Expr::in_subquery(
            Expr::qcol(PRIMARY_ALIAS, RECNUM),
            Select::new(vec![Expr::col(RECNUM)]).from(Source::new(Relation::temp(name))),
        );
        let npk = match self.strategy.shape {
            FilterShape::NonPrimaryOnly => self.npk.clone(),
            _ => None,
        };
        let terminal = Select::new(self.projection())
            .from(self.primary_source())
            .filter(Some(members))
            .filter(npk)
            .order_by(self.order(PRIMARY_ALIAS))
            .limit(limit);

        (
            Statement::CreateTempAs {
                name: name.to_string(),
                query: stage,
            },
            terminal,
        )
    }
}
