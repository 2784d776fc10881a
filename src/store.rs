//! The persisted "currently applied version" record.

use crate::db::{Database, DbError};
use crate::version::VersionId;
use thiserror::Error;

/// Default name of the table holding the applied version.
pub const DEFAULT_TABLE: &str = "mgr";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' is not a valid version table name")]
    InvalidTable(String),

    #[error("error while trying to fetch migration database version: {0}")]
    Db(#[from] DbError),

    #[error("version table '{table}' is corrupt: {reason}")]
    Corrupt { table: String, reason: String },
}

/// Whether `name` can be interpolated into SQL as an unquoted identifier.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

/// Reads and writes the single version row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStore {
    table: String,
}

impl VersionStore {
    pub fn new(table: &str) -> Result<Self, StoreError> {
        if !is_sql_identifier(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        Ok(Self {
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current version; zero when the table or its row is absent.
    pub fn read<D: Database + ?Sized>(&self, db: &mut D) -> Result<VersionId, StoreError> {
        if !db.version_table_exists(&self.table)? {
            return Ok(VersionId::zero());
        }

        let rows = db.read_versions(&self.table)?;
        match rows.as_slice() {
            [] => Ok(VersionId::zero()),
            [Some(value)] => VersionId::parse(value).ok_or_else(|| self.corrupt(format!(
                "'{}' is not a valid version",
                value
            ))),
            [None] => Err(self.corrupt("version is NULL".to_string())),
            many => Err(self.corrupt(format!("expected one row, found {}", many.len()))),
        }
    }

    /// Create the table if needed. Run outside of migration transactions.
    pub fn ensure<D: Database + ?Sized>(&self, db: &mut D) -> Result<(), DbError> {
        db.ensure_version_table(&self.table)
    }

    /// Record `version`. Runs inside the caller's transaction.
    pub fn write<D: Database + ?Sized>(&self, db: &mut D, version: &VersionId) -> Result<(), DbError> {
        db.write_version(&self.table, version.as_str())
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            table: self.table.clone(),
            reason,
        }
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}
