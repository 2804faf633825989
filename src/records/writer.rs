//! Record insertion and deletion
//!
//! Every insert or delete runs in one transaction together with its shadow
//! maintenance. When the series' synchronization triggers are installed the
//! store does that maintenance itself; otherwise the writer runs the
//! [`GroupVersionResolver`] before committing. Which of the two applies is
//! read from the store, so an index built under one sync mode stays correct
//! when written under the other.

use super::{cell_value, Record};
use crate::catalog::{Series, RECNUM};
use crate::error::{Error, Result};
use crate::shadow::{GroupVersionResolver, ShadowIndexManager};
use crate::sql::{Expr, Statement};
use crate::store::{in_transaction, RelationalStore, StoreError};
use crate::value::{format, Value};
use tracing::debug;

/// Writes records to a series' primary table
#[derive(Debug, Clone)]
pub struct RecordWriter {
    shadow: ShadowIndexManager,
    resolver: GroupVersionResolver,
}

impl RecordWriter {
    pub fn new(shadow: ShadowIndexManager) -> Self {
        let resolver = GroupVersionResolver::new(shadow.suffix());
        Self { shadow, resolver }
    }

    /// Whether this writer must maintain the shadow index itself
    fn resolves<S: RelationalStore + ?Sized>(&self, store: &S, series: &Series) -> Result<bool> {
        Ok(self.shadow.exists(store, series)? && !self.shadow.synced_by_trigger(store, series)?)
    }

    fn insert_one<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        record: &Record,
        resolve: bool,
    ) -> Result<i64> {
        let tuple = record.primary_tuple(series)?;
        let (columns, values): (Vec<String>, Vec<Expr>) = record
            .typed_values(series)?
            .into_iter()
            .map(|(name, value)| (name, Expr::lit(format(&value))))
            .unzip();

        let sql = store.dialect().render(&Statement::InsertValues {
            relation: series.relation(),
            columns,
            values,
            returning: vec![RECNUM.to_string()],
        })?;
        let recnum = store.query_i64(&sql)?.ok_or(StoreError::BadFieldCount {
            expected: 1,
            actual: 0,
        })?;

        if resolve {
            self.resolver.on_insert(store, series, &tuple, recnum)?;
        }
        debug!("{}: inserted recnum {}", series.name(), recnum);
        Ok(recnum)
    }

    /// Insert one record, returning its row identifier
    pub fn insert<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        record: &Record,
    ) -> Result<i64> {
        let resolve = self.resolves(store, series)?;
        in_transaction(store, || self.insert_one(store, series, record, resolve))
    }

    /// Insert several records in one transaction
    pub fn insert_all<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        records: &[Record],
    ) -> Result<Vec<i64>> {
        let resolve = self.resolves(store, series)?;
        in_transaction(store, || {
            let mut recnums = Vec::new();
            recnums.try_reserve(records.len())?;
            for record in records {
                recnums.push(self.insert_one(store, series, record, resolve)?);
            }
            Ok(recnums)
        })
    }

    /// Delete the row with `recnum`; false when no such row exists
    pub fn delete<S: RelationalStore + ?Sized>(
        &self,
        store: &S,
        series: &Series,
        recnum: i64,
    ) -> Result<bool> {
        let resolve = self.resolves(store, series)?;
        let sql = store.dialect().render(&Statement::Delete {
            relation: series.relation(),
            filter: Some(Expr::eq(Expr::col(RECNUM), Expr::int(recnum))),
            returning: series.primary_keys().to_vec(),
        })?;

        in_transaction(store, || {
            let rows = store.query_binary(&sql)?;
            let row = match rows.as_slice() {
                [] => return Ok(false),
                [row] => row,
                _ => {
                    return Err(Error::Inconsistent {
                        series: series.name().to_string(),
                        detail: format!("recnum {} matched {} rows", recnum, rows.len()),
                    })
                }
            };
            if resolve {
                let tuple = primary_tuple_of(series, row)?;
                self.resolver.on_delete(store, series, &tuple, recnum)?;
            }
            debug!("{}: deleted recnum {}", series.name(), recnum);
            Ok(true)
        })
    }
}

fn primary_tuple_of(series: &Series, row: &[crate::store::Cell]) -> Result<Vec<Value>> {
    let keys = series.primary_keys();
    if row.len() != keys.len() {
        return Err(StoreError::BadFieldCount {
            expected: keys.len(),
            actual: row.len(),
        }
        .into());
    }
    keys.iter()
        .zip(row)
        .map(|(key, cell)| cell_value(cell, series.attribute_type(key)?))
        .collect()
}
