//! SQLite-backed relational store
//!
//! One `rusqlite::Connection` per store. Temporary relations live in the
//! connection's temp schema and disappear when the store is dropped.
//!
//! Transactions nest: the outermost `begin` issues `BEGIN`, inner ones open
//! savepoints named by depth.

use super::{Cell, RelationalStore, Row, StoreError, StoreResult, TextRow};
use crate::sql::Dialect;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// SQLite store on a single connection
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    depth: std::cell::Cell<u32>,
}

impl SqliteStore {
    /// Open or create a database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Open(e.to_string()))?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Open(e.to_string()))?;

        // Configure for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )
        .map_err(|e| StoreError::Open(e.to_string()))?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            depth: std::cell::Cell::new(0),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")
            .map_err(|e| StoreError::Open(e.to_string()))?;

        Ok(Self {
            conn,
            path: None,
            depth: std::cell::Cell::new(0),
        })
    }

    /// Set how long a statement waits on a locked database
    pub fn with_busy_timeout(self, ms: u64) -> StoreResult<Self> {
        self.conn
            .busy_timeout(Duration::from_millis(ms))
            .map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(self)
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current transaction nesting depth
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    fn cell(value: ValueRef<'_>) -> Cell {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(v) => Cell::Integer(v),
            ValueRef::Real(v) => Cell::Real(v),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Text(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl RelationalStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str) -> StoreResult<usize> {
        debug!(target: "shadowtab::sql", "{}", sql);
        self.conn
            .execute(sql, [])
            .map_err(|e| StoreError::bad_query(sql, e))
    }

    fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        debug!(target: "shadowtab::sql", "{}", sql);
        self.conn
            .execute_batch(sql)
            .map_err(|e| StoreError::bad_query(sql, e))
    }

    fn query_text(&self, sql: &str) -> StoreResult<Vec<TextRow>> {
        Ok(self
            .query_binary(sql)?
            .iter()
            .map(|row| row.iter().map(Cell::to_text).collect())
            .collect())
    }

    fn query_binary(&self, sql: &str) -> StoreResult<Vec<Row>> {
        let mut out = Vec::new();
        self.query_each(sql, &mut |row| {
            out.push(row.clone());
            true
        })?;
        Ok(out)
    }

    fn query_each(&self, sql: &str, f: &mut dyn FnMut(&Row) -> bool) -> StoreResult<usize> {
        debug!(target: "shadowtab::sql", "{}", sql);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| StoreError::bad_query(sql, e))?;
        let width = stmt.column_count();
        let mut rows = stmt.query([]).map_err(|e| StoreError::bad_query(sql, e))?;

        let mut delivered = 0;
        while let Some(row) = rows.next().map_err(|e| StoreError::bad_query(sql, e))? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| StoreError::bad_query(sql, e))?;
                cells.push(Self::cell(value));
            }
            delivered += 1;
            if !f(&cells) {
                break;
            }
        }
        Ok(delivered)
    }

    fn begin(&self) -> StoreResult<()> {
        let depth = self.depth.get();
        let sql = if depth == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT shadowtab_sp{}", depth)
        };
        self.execute_batch(&sql)?;
        self.depth.set(depth + 1);
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let depth = self.depth.get();
        let sql = match depth {
            0 => return Ok(()),
            1 => "COMMIT".to_string(),
            d => format!("RELEASE SAVEPOINT shadowtab_sp{}", d - 1),
        };
        self.execute_batch(&sql)?;
        self.depth.set(depth - 1);
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let depth = self.depth.get();
        let sql = match depth {
            0 => return Ok(()),
            1 => "ROLLBACK".to_string(),
            d => format!(
                "ROLLBACK TO SAVEPOINT shadowtab_sp{0}; RELEASE SAVEPOINT shadowtab_sp{0}",
                d - 1
            ),
        };
        // The depth unwinds even if the store already aborted the transaction
        self.depth.set(depth - 1);
        self.execute_batch(&sql)
    }

    fn relation_exists(&self, name: &str) -> StoreResult<bool> {
        let sql = "SELECT count(*) FROM sqlite_master \
                   WHERE type IN ('table', 'view') AND lower(name) = lower(?1)";
        debug!(target: "shadowtab::sql", "{} [{}]", sql, name);
        let count: i64 = self
            .conn
            .query_row(sql, params![name], |row| row.get(0))
            .map_err(|e| StoreError::bad_query(sql, e))?;
        Ok(count > 0)
    }

    fn trigger_exists(&self, name: &str) -> StoreResult<bool> {
        let sql = "SELECT count(*) FROM sqlite_master \
                   WHERE type = 'trigger' AND lower(name) = lower(?1)";
        debug!(target: "shadowtab::sql", "{} [{}]", sql, name);
        let count: i64 = self
            .conn
            .query_row(sql, params![name], |row| row.get(0))
            .map_err(|e| StoreError::bad_query(sql, e))?;
        Ok(count > 0)
    }

    fn table_grants(&self, _name: &str) -> StoreResult<Vec<String>> {
        // SQLite has no access-control lists
        Ok(Vec::new())
    }
}
