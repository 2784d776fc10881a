//! Migration discovery
//!
//! Migrations are `.sql` files under a migrations root, read through the
//! [`Filesystem`] abstraction so discovery and scaffolding can run against
//! disk or an in-memory tree.

use crate::version::VersionId;
use std::path::PathBuf;
use thiserror::Error;

pub mod fs;
pub mod sql;

pub use fs::{DiskFs, EntryKind, Filesystem, MemoryFs};

/// A single discovered migration: one file, one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: VersionId,

    /// Display name, taken from the filename after the version prefix.
    pub name: String,

    /// Path of the source file relative to the migrations root.
    pub path: PathBuf,

    /// Script applied when migrating up.
    pub up: String,

    /// Script applied when migrating down. `None` when the file has no
    /// marker line, which makes the migration irreversible.
    pub down: Option<String>,
}

impl Migration {
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    /// `<id>_<name>`, the way the migration is named on disk.
    pub fn label(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }
}

/// A file that looked like a migration but could not be used as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything discovered under a migrations root, sorted by version.
#[derive(Debug, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
    rejected: Vec<Rejected>,
}

impl MigrationSet {
    /// Build a set, sorting by version and enforcing unique ids.
    pub fn new(mut migrations: Vec<Migration>, rejected: Vec<Rejected>) -> Result<Self, LoadError> {
        migrations.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.path.cmp(&b.path)));

        if let Some(pair) = migrations.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(LoadError::DuplicateVersion {
                id: pair[0].id.clone(),
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }

        Ok(Self {
            migrations,
            rejected,
        })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn rejected(&self) -> &[Rejected] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn get(&self, id: &VersionId) -> Option<&Migration> {
        self.migrations
            .binary_search_by(|m| m.id.cmp(id))
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub fn contains(&self, id: &VersionId) -> bool {
        self.get(id).is_some()
    }

    /// Newest discovered version, if any.
    pub fn latest(&self) -> Option<&VersionId> {
        self.migrations.last().map(|m| &m.id)
    }

    /// The newest discovered version strictly older than `id`, or zero.
    pub fn predecessor(&self, id: &VersionId) -> VersionId {
        let idx = self.migrations.partition_point(|m| m.id < *id);
        if idx == 0 {
            VersionId::zero()
        } else {
            self.migrations[idx - 1].id.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Duplicate migration version {id}: {first} and {second}")]
    DuplicateVersion {
        id: VersionId,
        first: PathBuf,
        second: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(id: &str, path: &str) -> Migration {
        Migration {
            id: VersionId::parse(id).expect("valid id"),
            name: "m".to_string(),
            path: PathBuf::from(path),
            up: String::new(),
            down: None,
        }
    }

    #[test]
    fn test_set_sorts_by_version_not_path() {
        let set = MigrationSet::new(
            vec![
                migration("100", "a/100_m.sql"),
                migration("zz", "b/zz_m.sql"),
                migration("a1", "c/a1_m.sql"),
            ],
            vec![],
        )
        .expect("set");

        let ids: Vec<&str> = set.migrations().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "zz", "100"]);
        assert_eq!(set.latest().map(VersionId::as_str), Some("100"));
    }

    #[test]
    fn test_set_rejects_duplicate_ids() {
        let err = MigrationSet::new(
            vec![migration("a1", "x/a1_m.sql"), migration("a1", "a1_other.sql")],
            vec![],
        )
        .unwrap_err();

        match err {
            LoadError::DuplicateVersion { id, first, second } => {
                assert_eq!(id.as_str(), "a1");
                assert_eq!(first, PathBuf::from("a1_other.sql"));
                assert_eq!(second, PathBuf::from("x/a1_m.sql"));
            }
            other => panic!("Expected DuplicateVersion, got: {:?}", other),
        }
    }

    #[test]
    fn test_predecessor() {
        let set = MigrationSet::new(
            vec![migration("a1", "a1_m.sql"), migration("a3", "a3_m.sql")],
            vec![],
        )
        .expect("set");

        let id = |s: &str| VersionId::parse(s).expect("valid id");
        assert_eq!(set.predecessor(&id("a1")), VersionId::zero());
        assert_eq!(set.predecessor(&id("a3")), id("a1"));
        // Versions that were never discovered still find their neighbour.
        assert_eq!(set.predecessor(&id("a2")), id("a1"));
        assert_eq!(set.predecessor(&id("b0")), id("a3"));
    }

    #[test]
    fn test_get_and_contains() {
        let set = MigrationSet::new(vec![migration("a1", "a1_m.sql")], vec![]).expect("set");
        assert!(set.contains(&VersionId::parse("a1").unwrap()));
        assert!(!set.contains(&VersionId::parse("a2").unwrap()));
        assert!(!set.is_empty());
        assert_eq!(set.len(), 1);
    }
}
