//! Database access
//!
//! The engine talks to the target database only through [`Database`], a
//! small blocking surface over one connection: explicit transaction
//! control, script execution, the version table and a run-wide lock.

use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use memory::MemoryDatabase;
pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;

/// Failure reported by a database backend.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DbError {
    message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<::postgres::Error> for DbError {
    fn from(err: ::postgres::Error) -> Self {
        // The postgres error's Display omits the server message; its
        // Debug form is noisy. Prefer the server's own text when present.
        match err.as_db_error() {
            Some(db) => Self::new(format!("{}: {}", db.severity(), db.message())),
            None => Self::new(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// One connection to the database being migrated.
///
/// `table` arguments are validated SQL identifiers (see
/// [`crate::store::is_sql_identifier`]) and are interpolated directly.
pub trait Database {
    /// Short backend name for logs and reports.
    fn backend(&self) -> &'static str;

    fn version_table_exists(&mut self, table: &str) -> Result<bool, DbError>;

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError>;

    /// Every row of the version table; `None` for NULL values.
    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError>;

    /// Replace the contents of the version table with a single row.
    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError>;

    fn begin(&mut self) -> Result<(), DbError>;

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError>;

    fn commit(&mut self) -> Result<(), DbError>;

    fn rollback(&mut self) -> Result<(), DbError>;

    /// Take the exclusive migration lock for this database, blocking until
    /// it is available.
    fn lock(&mut self) -> Result<(), DbError>;

    fn unlock(&mut self) -> Result<(), DbError>;
}

impl<D: Database + ?Sized> Database for Box<D> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn version_table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        (**self).version_table_exists(table)
    }

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError> {
        (**self).ensure_version_table(table)
    }

    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError> {
        (**self).read_versions(table)
    }

    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError> {
        (**self).write_version(table, version)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        (**self).begin()
    }

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError> {
        (**self).execute_script(sql)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        (**self).rollback()
    }

    fn lock(&mut self) -> Result<(), DbError> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        (**self).unlock()
    }
}

/// Where to connect, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// PostgreSQL `key=value` connection string.
    Dsn(String),
    /// PostgreSQL URL, or a `sqlite:` URL.
    Url(String),
}

impl ConnectionTarget {
    /// Pick the target from the mutually exclusive `--dsn` / `--url` values.
    pub fn from_flags(dsn: Option<String>, url: Option<String>) -> Result<Self, String> {
        match (dsn, url) {
            (Some(_), Some(_)) => Err(
                "Both 'dsn' and 'url' were defined, only one of them is needed".to_string(),
            ),
            (Some(dsn), None) => Ok(Self::Dsn(dsn)),
            (None, Some(url)) => Ok(Self::Url(url)),
            (None, None) => Err("One of 'dsn' or 'url' is required".to_string()),
        }
    }

    /// Path of the SQLite database when this is a `sqlite:` URL.
    pub fn sqlite_path(&self) -> Option<&str> {
        let Self::Url(url) = self else {
            return None;
        };
        let rest = url.strip_prefix("sqlite:")?;
        Some(rest.strip_prefix("//").unwrap_or(rest))
    }

    /// Open the connection. Credentials never appear in the returned error.
    pub fn connect(&self) -> Result<Box<dyn Database>, DbError> {
        if let Some(path) = self.sqlite_path() {
            return Ok(Box::new(SqliteDatabase::open(path)?));
        }
        let params = match self {
            Self::Dsn(s) | Self::Url(s) => s,
        };
        Ok(Box::new(PostgresDatabase::connect(params)?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dsn(_) => "dsn",
            Self::Url(_) => "url",
        }
    }
}
