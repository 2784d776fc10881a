//! SQL migration file loading
//!
//! Reads `<version>_<name>.sql` files through a [`Filesystem`] and splits
//! each body on the marker line into its up and down scripts.

use crate::input::{Filesystem, LoadError, Migration, MigrationSet, Rejected};
use crate::plan::LATEST;
use crate::version::VersionId;
use std::path::Path;

/// Line separating the up script (above) from the down script (below).
pub const MARKER: &str = "/* UP MIGRATION ABOVE / DOWN MIGRATION BELOW */";

/// Loader for plain SQL migration files.
///
/// Files whose names do not start with a valid version are rejected: they
/// are logged and listed in [`MigrationSet::rejected`] but do not abort
/// discovery. Unreadable files, files with more than one marker and
/// duplicate versions do abort it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLoader;

impl SqlLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load<F: Filesystem + ?Sized>(&self, fs: &F) -> Result<MigrationSet, LoadError> {
        let files = fs.sql_files().map_err(|e| LoadError::Io {
            path: fs.display_path(Path::new("")),
            source: e,
        })?;

        let mut migrations = Vec::new();
        let mut rejected = Vec::new();

        for path in files {
            let file_name = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default();

            let (id, name) = match parse_filename(&file_name) {
                Ok(parts) => parts,
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "skipping migration file");
                    rejected.push(Rejected { path, reason });
                    continue;
                }
            };

            let source = fs.read_to_string(&path).map_err(|e| LoadError::Io {
                path: fs.display_path(&path),
                source: e,
            })?;

            let (up, down) = split_source(&source).map_err(|message| LoadError::Parse {
                path: fs.display_path(&path),
                message,
            })?;

            migrations.push(Migration {
                id,
                name,
                path,
                up,
                down,
            });
        }

        let set = MigrationSet::new(migrations, rejected)?;
        tracing::debug!(
            migrations = set.len(),
            rejected = set.rejected().len(),
            "loaded migration files"
        );
        Ok(set)
    }
}

/// Split `<version>_<name>.sql` into its version and name.
pub fn parse_filename(file_name: &str) -> Result<(VersionId, String), String> {
    let stem = file_name
        .strip_suffix(".sql")
        .or_else(|| file_name.strip_suffix(".SQL"))
        .ok_or_else(|| "missing .sql extension".to_string())?;

    let (prefix, name) = stem
        .split_once('_')
        .ok_or_else(|| format!("expected '<version>_<name>.sql', got '{}'", file_name))?;

    let id = VersionId::parse(prefix)
        .ok_or_else(|| format!("'{}' is not a valid version", prefix))?;

    if id.is_zero() {
        return Err("version 0 is reserved for the empty database".to_string());
    }
    if id.as_str() == LATEST {
        return Err(format!("version '{}' is a reserved target keyword", LATEST));
    }
    if name.is_empty() {
        return Err("migration name is empty".to_string());
    }

    Ok((id, name.to_string()))
}

/// Split a migration body on the marker line.
///
/// Returns the up script and, if the marker is present, the down script.
/// Both are trimmed of surrounding whitespace.
pub fn split_source(source: &str) -> Result<(String, Option<String>), String> {
    let mut up = Vec::new();
    let mut down: Option<Vec<&str>> = None;

    for line in source.lines() {
        if line.trim() == MARKER {
            if down.is_some() {
                return Err("marker line appears more than once".to_string());
            }
            down = Some(Vec::new());
            continue;
        }
        match down.as_mut() {
            Some(lines) => lines.push(line),
            None => up.push(line),
        }
    }

    Ok((
        up.join("\n").trim().to_string(),
        down.map(|lines| lines.join("\n").trim().to_string()),
    ))
}
