//! Plan building
//!
//! A [`Plan`] is the ordered list of migrations that moves the database from
//! its current version to a target. Only version ordering decides the
//! sequence, so the plan never depends on how files were laid out on disk.

use crate::input::{Migration, MigrationSet};
use crate::version::VersionId;
use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

/// Keyword resolving to the newest discovered migration.
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    NoOp,
}

/// Requested destination of a migrate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Latest,
    Version(VersionId),
}

impl Target {
    /// Parse a command-line version argument (`latest`, `0` or a version).
    pub fn parse(token: &str) -> Result<Self, PlanError> {
        if token.eq_ignore_ascii_case(LATEST) {
            return Ok(Target::Latest);
        }
        VersionId::parse(token)
            .map(Target::Version)
            .ok_or_else(|| PlanError::InvalidVersion(token.to_string()))
    }

    /// Resolve against discovered migrations.
    pub fn resolve(&self, set: &MigrationSet) -> Result<VersionId, PlanError> {
        match self {
            Target::Latest => Ok(set.latest().cloned().unwrap_or_else(VersionId::zero)),
            Target::Version(id) if id.is_zero() || set.contains(id) => Ok(id.clone()),
            Target::Version(id) => Err(PlanError::UnknownVersion(id.clone())),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Latest => f.write_str(LATEST),
            Target::Version(id) => write!(f, "{}", id),
        }
    }
}

/// One migration to run, plus the version recorded once it commits.
#[derive(Debug, Clone)]
pub struct PlanStep<'a> {
    pub migration: &'a Migration,
    pub record: VersionId,
}

#[derive(Debug, Clone)]
pub struct Plan<'a> {
    pub direction: Direction,
    pub from: VersionId,
    pub to: VersionId,
    pub steps: Vec<PlanStep<'a>>,
}

impl Plan<'_> {
    pub fn is_noop(&self) -> bool {
        self.direction == Direction::NoOp
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.migration.id.as_str()).collect()
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("'{0}' is not a valid migration version")]
    InvalidVersion(String),

    #[error("unknown migration version {0}")]
    UnknownVersion(VersionId),

    #[error("database is at version {0}, which has no migration file")]
    UnknownCurrent(VersionId),

    #[error("migration {id} ({name}) has no down script and cannot be reverted")]
    Irreversible { id: VersionId, name: String },
}

/// Compute the plan moving `current` to `target`.
///
/// Up plans contain every migration in `(current, target]` in ascending
/// order, each recording its own version. Down plans contain every
/// migration in `(target, current]` in descending order, each recording
/// the version of the migration applied just before it (or zero).
/// A non-zero `current` must name a discovered migration.
pub fn build<'a>(
    current: &VersionId,
    target: &Target,
    set: &'a MigrationSet,
) -> Result<Plan<'a>, PlanError> {
    if !current.is_zero() && !set.contains(current) {
        return Err(PlanError::UnknownCurrent(current.clone()));
    }
    let to = target.resolve(set)?;

    let direction = if to == *current {
        Direction::NoOp
    } else if to.is_newer_than(current) {
        Direction::Up
    } else {
        Direction::Down
    };

    let steps = match direction {
        Direction::NoOp => Vec::new(),
        Direction::Up => set
            .migrations()
            .iter()
            .filter(|m| m.id.is_newer_than(current) && m.id <= to)
            .map(|m| PlanStep {
                migration: m,
                record: m.id.clone(),
            })
            .collect(),
        Direction::Down => {
            let selected: Vec<&Migration> = set
                .migrations()
                .iter()
                .filter(|m| m.id.is_newer_than(&to) && m.id <= *current)
                .collect();

            if let Some(m) = selected.iter().find(|m| !m.is_reversible()) {
                return Err(PlanError::Irreversible {
                    id: m.id.clone(),
                    name: m.name.clone(),
                });
            }

            selected
                .into_iter()
                .rev()
                .map(|m| PlanStep {
                    migration: m,
                    record: set.predecessor(&m.id),
                })
                .collect()
        }
    };

    Ok(Plan {
        direction,
        from: current.clone(),
        to,
        steps,
    })
}
