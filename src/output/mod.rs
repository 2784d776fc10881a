//! Output reporters for migration runs
//!
//! Supports human-readable text and JSON output.

use crate::engine::RunReport;
use crate::error::MigrateError;
use crate::plan::{Direction, Plan, PlanStep};
use crate::version::VersionId;
use serde::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

pub mod json;
pub mod text;

pub use json::JsonReporter;
pub use text::TextReporter;

/// Output formats accepted by `--format` and `[output] format`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Receives progress from a run as it happens.
///
/// Every hook defaults to doing nothing so reporters only implement the
/// events they render.
pub trait Reporter {
    /// The version read from the store, before planning.
    fn current_version(&mut self, _version: &VersionId) {}

    /// The plan about to be executed (or only shown, for a dry run).
    fn planned(&mut self, _plan: &Plan<'_>, _dry_run: bool) {}

    /// A step's transaction committed.
    fn committed(&mut self, _direction: Direction, _step: &PlanStep<'_>) {}

    /// The run finished without error.
    fn finished(&mut self, _report: &RunReport) {}

    /// The run stopped with `error`. The error itself is also returned to
    /// the caller.
    fn failed(&mut self, _error: &MigrateError) {}
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct Silent;

impl Reporter for Silent {}

/// Reporter writing `format` to stdout.
pub fn stdout_reporter(format: Format) -> Box<dyn Reporter> {
    match format {
        Format::Text => Box::new(TextReporter::new(std::io::stdout())),
        Format::Json => Box::new(JsonReporter::new(std::io::stdout())),
    }
}
