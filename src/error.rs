//! Errors surfaced to the command layer.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::executor::ExecutionError;
use crate::input::LoadError;
use crate::plan::PlanError;
use crate::scaffold::ScaffoldError;
use crate::store::StoreError;
use thiserror::Error;

/// Exit code for a migration that failed while executing.
pub const EXIT_MIGRATION_FAILED: i32 = 1;

/// Exit code for every other tool error.
pub const EXIT_TOOL_ERROR: i32 = 2;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{0}")]
    Argument(String),

    #[error("error while trying to connect to database with {kind}: {source}")]
    Connection {
        kind: &'static str,
        #[source]
        source: DbError,
    },

    #[error("could not {action} the migration lock: {source}")]
    Lock {
        action: &'static str,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl MigrateError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrateError::Execution(_) => EXIT_MIGRATION_FAILED,
            _ => EXIT_TOOL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionId;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Argument("x".into()).exit_code(), EXIT_TOOL_ERROR);

        let unknown = MigrateError::from(PlanError::UnknownVersion(
            VersionId::parse("b9").expect("valid id"),
        ));
        assert_eq!(unknown.exit_code(), EXIT_TOOL_ERROR);
        assert_eq!(unknown.to_string(), "unknown migration version b9");
    }

    #[test]
    fn test_connection_message_names_flag_not_value() {
        let err = MigrateError::Connection {
            kind: "dsn",
            source: DbError::new("connection refused"),
        };
        assert_eq!(
            err.to_string(),
            "error while trying to connect to database with dsn: connection refused"
        );
    }
}
