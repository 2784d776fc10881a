//! mgx: versioned SQL schema migrations
//!
//! This library discovers timestamp-versioned migration files, plans the
//! steps between the database's recorded version and a target, and applies
//! them one transaction per migration against PostgreSQL or SQLite.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod input;
pub mod output;
pub mod plan;
pub mod scaffold;
pub mod store;
pub mod version;

// Re-export commonly used types
pub use config::Config;
pub use db::{ConnectionTarget, Database, DbError};
pub use engine::{Migrator, Repository, RunReport};
pub use error::MigrateError;
pub use input::{DiskFs, Filesystem, MemoryFs, Migration, MigrationSet};
pub use plan::{Direction, Plan, Target};
pub use store::VersionStore;
pub use version::VersionId;
