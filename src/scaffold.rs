//! Creation of new, empty migration files.

use crate::input::sql::MARKER;
use crate::input::{EntryKind, Filesystem};
use crate::version::VersionId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("illegal substring '..' found in '{path}'")]
    PathTraversal { path: String },

    #[error("no migration name in '{path}'")]
    EmptyName { path: String },

    #[error("expected '{path}' to be a folder, but instead it is a file")]
    NotADirectory { path: PathBuf },

    #[error("migration file '{path}' already exists")]
    AlreadyExists { path: PathBuf },

    #[error("could not create '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Body written into every new migration.
pub fn template() -> String {
    format!("\n\n{}\n\n", MARKER)
}

/// Refuse paths that could escape the migrations root.
pub fn check_path(relative: &str) -> Result<(), ScaffoldError> {
    if relative.contains("..") {
        return Err(ScaffoldError::PathTraversal {
            path: relative.to_string(),
        });
    }
    Ok(())
}

/// Create `<dirs>/<id>_<basename>.sql` under the migrations root.
///
/// `relative` is a `/`-separated path; its last segment, cut at the first
/// `.`, becomes the migration name. Paths containing `..` are refused
/// before anything is touched. Returns the new file's relative path.
pub fn create<F: Filesystem + ?Sized>(
    fs: &F,
    relative: &str,
    id: &VersionId,
) -> Result<PathBuf, ScaffoldError> {
    check_path(relative)?;

    let (dirs, base) = match relative.rfind(['/', '\\']) {
        Some(idx) => (&relative[..idx], &relative[idx + 1..]),
        None => ("", relative),
    };
    let name = base.split('.').next().unwrap_or_default();
    if name.is_empty() {
        return Err(ScaffoldError::EmptyName {
            path: relative.to_string(),
        });
    }

    let mut dir = PathBuf::new();
    for segment in dirs
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
    {
        dir.push(segment);
        match fs.kind(&dir) {
            Some(EntryKind::Dir) => {}
            Some(EntryKind::File) => {
                return Err(ScaffoldError::NotADirectory {
                    path: fs.display_path(&dir),
                });
            }
            None => fs.create_dir(&dir).map_err(|e| ScaffoldError::Io {
                path: fs.display_path(&dir),
                source: e,
            })?,
        }
    }

    let path = dir.join(format!("{}_{}.sql", id, name));
    if fs.kind(&path).is_some() {
        return Err(ScaffoldError::AlreadyExists {
            path: fs.display_path(&path),
        });
    }

    fs.create_new(&path, &template())
        .map_err(|e| ScaffoldError::Io {
            path: fs.display_path(&path),
            source: e,
        })?;

    tracing::info!(path = %fs.display_path(&path).display(), "created migration");
    Ok(path)
}
