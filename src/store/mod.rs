//! Relational Store
//!
//! The single connection a session talks to. Statements are plain text
//! rendered by [`crate::sql`]; results come back as text rows or typed cells.
//!
//! # Statement batches
//!
//! A planned query is a batch of setup statements (temporary relations)
//! followed by one terminal statement. Rendered as text, statements are joined
//! by [`BATCH_SEPARATOR`] so the setup/result boundary can be recovered.

mod error;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;

use crate::sql::Dialect;

/// Literal marker between statements of a rendered batch
pub const BATCH_SEPARATOR: &str = ";\n--@@\n";

/// A typed result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    /// Integer payload, accepting integral reals and numeric text
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(*v),
            Cell::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Real payload
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Null => None,
        }
    }

    /// Text rendering, `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Integer(v) => Some(v.to_string()),
            Cell::Real(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

/// A typed result row
pub type Row = Vec<Cell>;

/// A text result row
pub type TextRow = Vec<Option<String>>;

/// Setup statements followed by one terminal statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatementBatch {
    pub setup: Vec<String>,
    pub terminal: String,
}

impl StatementBatch {
    /// A batch with no setup
    pub fn single(terminal: impl Into<String>) -> Self {
        Self {
            setup: Vec::new(),
            terminal: terminal.into(),
        }
    }

    /// Join all statements with the separator marker
    pub fn render(&self) -> String {
        let mut parts: Vec<&str> = self.setup.iter().map(String::as_str).collect();
        parts.push(&self.terminal);
        parts.join(BATCH_SEPARATOR)
    }

    /// Split rendered text back into setup and terminal statements
    pub fn parse(text: &str) -> Self {
        let mut parts: Vec<String> = text
            .split(BATCH_SEPARATOR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let terminal = parts.pop().unwrap_or_default();
        Self {
            setup: parts,
            terminal,
        }
    }

    /// Number of statements in the batch
    pub fn len(&self) -> usize {
        self.setup.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty() && self.setup.is_empty()
    }
}

/// A relational store reachable through a query/execute interface
pub trait RelationalStore {
    /// Dialect statements must be rendered in
    fn dialect(&self) -> Dialect;

    /// Execute one statement, returning the number of rows affected
    fn execute(&self, sql: &str) -> StoreResult<usize>;

    /// Execute several `;`-separated statements
    fn execute_batch(&self, sql: &str) -> StoreResult<()>;

    /// Run a query and return every row as text
    fn query_text(&self, sql: &str) -> StoreResult<Vec<TextRow>>;

    /// Run a query and return every row as typed cells
    fn query_binary(&self, sql: &str) -> StoreResult<Vec<Row>>;

    /// Run a query and hand rows to `f` one at a time until it returns false
    ///
    /// Returns the number of rows delivered.
    fn query_each(&self, sql: &str, f: &mut dyn FnMut(&Row) -> bool) -> StoreResult<usize>;

    /// Open a transaction (nested calls open savepoints)
    fn begin(&self) -> StoreResult<()>;

    /// Commit the innermost open transaction
    fn commit(&self) -> StoreResult<()>;

    /// Roll back the innermost open transaction
    fn rollback(&self) -> StoreResult<()>;

    /// Check whether a table or view exists (case-insensitive)
    fn relation_exists(&self, name: &str) -> StoreResult<bool>;

    /// Check whether a trigger exists (case-insensitive)
    fn trigger_exists(&self, name: &str) -> StoreResult<bool>;

    /// Access-control entries of a table, as `grantee=codes/grantor` strings
    fn table_grants(&self, name: &str) -> StoreResult<Vec<String>>;

    /// Run a statement expected to return exactly one integer
    fn query_i64(&self, sql: &str) -> StoreResult<Option<i64>> {
        let rows = self.query_binary(sql)?;
        match rows.first() {
            None => Ok(None),
            Some(row) if row.len() != 1 => Err(StoreError::BadFieldCount {
                expected: 1,
                actual: row.len(),
            }),
            Some(row) => Ok(row[0].as_i64()),
        }
    }

    /// Execute a batch statement by statement, returning the terminal's rows
    fn run_batch(&self, batch: &StatementBatch) -> StoreResult<Vec<Row>> {
        for stmt in &batch.setup {
            self.execute(stmt)?;
        }
        self.query_binary(&batch.terminal)
    }
}

/// Run `f` inside a transaction, committing on success and rolling back on error
pub fn in_transaction<S, T, F>(store: &S, f: F) -> crate::Result<T>
where
    S: RelationalStore + ?Sized,
    F: FnOnce() -> crate::Result<T>,
{
    store.begin()?;
    match f() {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!("Rollback failed after error '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_render_and_parse() {
        let batch = StatementBatch {
            setup: vec![
                "CREATE TEMPORARY TABLE shadowtmp0 AS SELECT recnum FROM s".to_string(),
                "CREATE TEMPORARY TABLE shadowtmp1 AS SELECT * FROM shadowtmp0".to_string(),
            ],
            terminal: "SELECT * FROM t".to_string(),
        };
        let text = batch.render();
        assert_eq!(text.matches(BATCH_SEPARATOR).count(), 2);
        assert_eq!(StatementBatch::parse(&text), batch);
        assert_eq!(batch.len(), 3);

        let single = StatementBatch::single("SELECT 1");
        assert_eq!(single.render(), "SELECT 1");
        assert_eq!(StatementBatch::parse("SELECT 1"), single);
    }

    #[test]
    fn test_cell_accessors() {
        assert_eq!(Cell::Integer(4).as_i64(), Some(4));
        assert_eq!(Cell::Real(4.0).as_i64(), Some(4));
        assert_eq!(Cell::Real(4.5).as_i64(), None);
        assert_eq!(Cell::Text(" 12 ".to_string()).as_i64(), Some(12));
        assert_eq!(Cell::Null.to_text(), None);
        assert_eq!(Cell::Real(0.5).to_text(), Some("0.5".to_string()));
    }

    #[test]
    fn test_in_transaction_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute("CREATE TABLE t (x INTEGER)").unwrap();

        let result: crate::Result<()> = in_transaction(&store, || {
            store.execute("INSERT INTO t VALUES (1)")?;
            Err(crate::Error::InvalidRequest("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.query_i64("SELECT count(*) FROM t").unwrap(), Some(0));

        in_transaction(&store, || {
            store.execute("INSERT INTO t VALUES (2)")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(store.query_i64("SELECT count(*) FROM t").unwrap(), Some(1));
    }

    #[test]
    fn test_nested_transaction_uses_savepoint() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.execute("CREATE TABLE t (x INTEGER)").unwrap();

        in_transaction(&store, || {
            store.execute("INSERT INTO t VALUES (1)")?;
            let inner: crate::Result<()> = in_transaction(&store, || {
                store.execute("INSERT INTO t VALUES (2)")?;
                Err(crate::Error::InvalidRequest("inner".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        assert_eq!(store.query_i64("SELECT sum(x) FROM t").unwrap(), Some(1));
    }
}
