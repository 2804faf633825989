//! Group version resolution
//!
//! After a row `r` with primary-key tuple `t` is inserted into or deleted from
//! a primary table, the shadow row for `t` must again hold the group's version
//! count and maximum row identifier.
//!
//! ```text
//! insert  count(t) = 1              NewGroup              insert (t, 1, r)
//!         max(t) = r                NewCurrentVersion     count + 1, recnum = r
//!         max(t) > r                ObsoleteVersionAdded  count + 1
//! delete  count(t) = 0              LastVersionRemoved    delete shadow row
//!         max(t) < r                CurrentVersionRemoved count - 1, recnum = max(t)
//!         max(t) > r                ObsoleteVersionRemoved count - 1
//! ```
//!
//! Counts and maxima come from the primary table after the mutation, never
//! from the shadow row. Every statement runs in the caller's transaction.

use crate::catalog::{Series, NRECORDS, RECNUM};
use crate::error::{Error, Result};
use crate::sql::{BinOp, Expr, Relation, Select, Source, Statement};
use crate::store::{RelationalStore, StoreError};
use crate::value::{format, Value};
use serde::Serialize;
use tracing::debug;

/// Outcome of inserting a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "transition")]
pub enum InsertTransition {
    /// First version of a new group
    NewGroup,
    /// Inserted row is the group's new current version
    NewCurrentVersion,
    /// Inserted row is older than the current version
    ObsoleteVersionAdded,
}

/// Outcome of deleting a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "transition")]
pub enum DeleteTransition {
    /// Group has no versions left
    LastVersionRemoved,
    /// Current version removed; `exposed` is the new current version
    CurrentVersionRemoved { exposed: i64 },
    /// An already superseded version was removed
    ObsoleteVersionRemoved,
}

impl InsertTransition {
    /// Classify an insert of `recnum` given the group's size and maximum after it
    pub fn classify(count: i64, max: i64, recnum: i64) -> Option<Self> {
        match count {
            n if n <= 0 => None,
            1 if max == recnum => Some(InsertTransition::NewGroup),
            1 => None,
            _ if max == recnum => Some(InsertTransition::NewCurrentVersion),
            _ if max > recnum => Some(InsertTransition::ObsoleteVersionAdded),
            _ => None,
        }
    }
}

impl DeleteTransition {
    /// Classify a delete of `recnum` given the group's size and maximum after it
    pub fn classify(remaining: i64, max: Option<i64>, recnum: i64) -> Option<Self> {
        if remaining == 0 {
            return Some(DeleteTransition::LastVersionRemoved);
        }
        match max? {
            m if m > recnum => Some(DeleteTransition::ObsoleteVersionRemoved),
            m if m < recnum => Some(DeleteTransition::CurrentVersionRemoved { exposed: m }),
            _ => None,
        }
    }
}

/// Equality of each primary-key column with a literal value
pub(crate) fn tuple_filter(series: &Series, qualifier: Option<&str>, tuple: &[Value]) -> Result<Expr> {
    let keys = series.primary_keys();
    if keys.len() != tuple.len() {
        return Err(Error::InvalidRequest(format!(
            "series {} has {} primary-key attributes, got {} values",
            series.name(),
            keys.len(),
            tuple.len()
        )));
    }
    let parts = keys.iter().zip(tuple).map(|(key, value)| {
        let column = match qualifier {
            Some(q) => Expr::qcol(q, key.as_str()),
            None => Expr::col(key.as_str()),
        };
        Expr::eq(column, Expr::lit(format(value)))
    });
    Ok(Expr::all(parts).unwrap_or(Expr::And(Vec::new())))
}

/// Adjust a shadow row's count by `delta`, optionally setting its row identifier
pub(crate) fn adjust_statement(shadow: &Relation, filter: Expr, delta: i64, recnum: Option<Expr>) -> Statement {
    let op = if delta >= 0 { BinOp::Plus } else { BinOp::Minus };
    let mut assignments = vec![(
        NRECORDS.to_string(),
        Expr::binary(Expr::col(NRECORDS), op, Expr::int(delta.abs())),
    )];
    if let Some(recnum) = recnum {
        assignments.push((RECNUM.to_string(), recnum));
    }
    Statement::Update {
        relation: shadow.clone(),
        assignments,
        filter: Some(filter),
    }
}

/// Procedural shadow maintenance, for stores without a synchronization trigger
#[derive(Debug, Clone)]
pub struct GroupVersionResolver {
    suffix: String,
}

impl GroupVersionResolver {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    fn shadow(&self, series: &Series) -> Relation {
        Relation::named(series.shadow_name(&self.suffix))
    }

    /// Group size and maximum row identifier in the primary table
    fn group_stats<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        tuple: &[Value],
    ) -> Result<(i64, Option<i64>)> {
        let query = Select::new(vec![Expr::CountStar, Expr::max(Expr::col(RECNUM))])
            .from(Source::new(series.relation()))
            .filter(Some(tuple_filter(series, None, tuple)?));
        let sql = store.dialect().render(&Statement::Select(query))?;
        let rows = store.query_binary(&sql)?;
        let row = rows.first().ok_or(StoreError::BadFieldCount {
            expected: 2,
            actual: 0,
        })?;
        if row.len() != 2 {
            return Err(StoreError::BadFieldCount {
                expected: 2,
                actual: row.len(),
            }
            .into());
        }
        Ok((row[0].as_i64().unwrap_or(0), row[1].as_i64()))
    }

    fn apply<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        stmt: &Statement,
        tuple: &[Value],
    ) -> Result<()> {
        let sql = store.dialect().render(stmt)?;
        let affected = store.execute(&sql)?;
        if affected != 1 {
            return Err(Error::Inconsistent {
                series: series.name().to_string(),
                detail: format!("expected one shadow row for {:?}, touched {}", tuple, affected),
            });
        }
        Ok(())
    }

    /// Bring the shadow row up to date after inserting `recnum` with `tuple`
    pub fn on_insert<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        tuple: &[Value],
        recnum: i64,
    ) -> Result<InsertTransition> {
        let (count, max) = self.group_stats(store, series, tuple)?;
        let transition = InsertTransition::classify(count, max.unwrap_or(i64::MIN), recnum)
            .ok_or_else(|| Error::Inconsistent {
                series: series.name().to_string(),
                detail: format!(
                    "insert of recnum {} saw group count {} and max {:?}",
                    recnum, count, max
                ),
            })?;

        let shadow = self.shadow(series);
        let filter = tuple_filter(series, None, tuple)?;
        let stmt = match transition {
            InsertTransition::NewGroup => {
                let mut columns = series.primary_keys().to_vec();
                columns.push(NRECORDS.to_string());
                columns.push(RECNUM.to_string());
                let mut values: Vec<Expr> = tuple.iter().map(|v| Expr::lit(format(v))).collect();
                values.push(Expr::int(1));
                values.push(Expr::int(recnum));
                Statement::InsertValues {
                    relation: shadow,
                    columns,
                    values,
                    returning: Vec::new(),
                }
            }
            InsertTransition::NewCurrentVersion => {
                adjust_statement(&shadow, filter, 1, Some(Expr::int(recnum)))
            }
            InsertTransition::ObsoleteVersionAdded => adjust_statement(&shadow, filter, 1, None),
        };
        self.apply(store, series, &stmt, tuple)?;

        debug!(
            "{}: insert recnum {} -> {:?}",
            series.name(),
            recnum,
            transition
        );
        Ok(transition)
    }

    /// Bring the shadow row up to date after deleting `recnum` with `tuple`
    pub fn on_delete<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        tuple: &[Value],
        recnum: i64,
    ) -> Result<DeleteTransition> {
        let (remaining, max) = self.group_stats(store, series, tuple)?;
        let transition = DeleteTransition::classify(remaining, max, recnum).ok_or_else(|| {
            Error::Inconsistent {
                series: series.name().to_string(),
                detail: format!(
                    "delete of recnum {} saw group count {} and max {:?}",
                    recnum, remaining, max
                ),
            }
        })?;

        let shadow = self.shadow(series);
        let filter = tuple_filter(series, None, tuple)?;
        let stmt = match transition {
            DeleteTransition::LastVersionRemoved => Statement::Delete {
                relation: shadow,
                filter: Some(filter),
                returning: Vec::new(),
            },
            DeleteTransition::CurrentVersionRemoved { exposed } => {
                adjust_statement(&shadow, filter, -1, Some(Expr::int(exposed)))
            }
            DeleteTransition::ObsoleteVersionRemoved => adjust_statement(&shadow, filter, -1, None),
        };
        self.apply(store, series, &stmt, tuple)?;

        debug!(
            "{}: delete recnum {} -> {:?}",
            series.name(),
            recnum,
            transition
        );
        Ok(transition)
    }
}
