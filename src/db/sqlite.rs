//! SQLite backend on `rusqlite`.
//!
//! SQLite has no session-level advisory lock, so the run-wide lock is a
//! no-op here. Transactions are opened with `BEGIN IMMEDIATE`, which takes
//! the write lock up front; the executor re-reads the stored version inside
//! each transaction, so a concurrent run that got there first is detected
//! before any script runs.

use crate::db::{Database, DbError};
use rusqlite::{Connection, params};
use std::path::Path;

pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, DbError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Direct access to the connection, for inspecting schema in tests
    /// and tools.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Database for SqliteDatabase {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn version_table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError> {
        self.conn
            .execute_batch(&format!("CREATE TABLE IF NOT EXISTS {} (ver TEXT)", table))?;
        Ok(())
    }

    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError> {
        let mut stmt = self.conn.prepare(&format!("SELECT ver FROM {}", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, Option<String>>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError> {
        self.conn.execute(&format!("DELETE FROM {}", table), [])?;
        self.conn.execute(
            &format!("INSERT INTO {} (ver) VALUES (?1)", table),
            params![version],
        )?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}
