//! Plan execution
//!
//! Runs a plan's setup statements, then its terminal statement either as one
//! result set or row by row through a cursor callback.

use super::plan::QueryPlan;
use crate::error::Result;
use crate::store::{RelationalStore, Row, StoreError};
use serde::Serialize;
use tracing::debug;

/// Rows of an executed select
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    #[serde(skip)]
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Integer values of one column, in row order
    pub fn integers(&self, name: &str) -> Vec<Option<i64>> {
        match self.column(name) {
            Some(i) => self.rows.iter().map(|r| r.get(i).and_then(|c| c.as_i64())).collect(),
            None => Vec::new(),
        }
    }
}

/// Executes plans against one store
pub struct QueryExecutor<'a, S: RelationalStore + ?Sized> {
    store: &'a S,
    drop_temps: bool,
}

impl<'a, S: RelationalStore + ?Sized> QueryExecutor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            drop_temps: false,
        }
    }

    /// Drop a plan's temporary relations once its rows are read
    ///
    /// Off by default; temporary relations otherwise live until the session ends.
    pub fn dropping_temps(mut self, drop_temps: bool) -> Self {
        self.drop_temps = drop_temps;
        self
    }

    fn setup(&self, plan: &QueryPlan) -> Result<String> {
        let batch = plan.render(self.store.dialect())?;
        for stmt in &batch.setup {
            self.store.execute(stmt)?;
        }
        Ok(batch.terminal)
    }

    fn finish(&self, plan: &QueryPlan) -> Result<()> {
        if !self.drop_temps {
            return Ok(());
        }
        let dialect = self.store.dialect();
        for stmt in plan.cleanup() {
            self.store.execute(&dialect.render(&stmt)?)?;
        }
        Ok(())
    }

    /// Run a select plan and collect every row
    pub fn fetch(&self, plan: &QueryPlan) -> Result<QueryResult> {
        let terminal = self.setup(plan)?;
        let rows = self.store.query_binary(&terminal)?;
        self.finish(plan)?;
        debug!("{}: fetched {} rows", plan.series, rows.len());
        Ok(QueryResult {
            columns: plan.columns.clone(),
            rows,
        })
    }

    /// Run a select plan, handing rows to `f` until it returns false
    ///
    /// Returns the number of rows delivered.
    pub fn stream(&self, plan: &QueryPlan, f: &mut dyn FnMut(&Row) -> bool) -> Result<usize> {
        let terminal = self.setup(plan)?;
        let delivered = self.store.query_each(&terminal, f)?;
        self.finish(plan)?;
        debug!("{}: streamed {} rows", plan.series, delivered);
        Ok(delivered)
    }

    /// Run a count plan
    pub fn count(&self, plan: &QueryPlan) -> Result<u64> {
        let terminal = self.setup(plan)?;
        let count = self.store.query_i64(&terminal)?;
        self.finish(plan)?;
        let count = count.ok_or(StoreError::BadFieldCount {
            expected: 1,
            actual: 0,
        })?;
        Ok(count.max(0) as u64)
    }
}
