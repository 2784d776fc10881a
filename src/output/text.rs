//! Human-readable text output reporter
//!
//! Produces plain text output suitable for terminal display:
//! ```text
//! version of currently installed migration: 0
//! migrating up from 0 to l1zzec5c (1 migration)
//! applied l1zzec5c_create_users
//! database is now at version l1zzec5c
//! ```

use crate::engine::RunReport;
use crate::output::Reporter;
use crate::plan::{Direction, Plan, PlanStep};
use crate::version::VersionId;
use std::io::Write;

pub struct TextReporter<W> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // Output failures never interrupt a run that is changing the database.
        let _ = writeln!(self.out, "{}", text);
    }
}

fn verb(direction: Direction, done: bool) -> &'static str {
    match (direction, done) {
        (Direction::Down, true) => "reverted",
        (Direction::Down, false) => "revert",
        (_, true) => "applied",
        (_, false) => "apply",
    }
}

/// Format the plan summary line.
fn format_plan(plan: &Plan<'_>) -> String {
    let count = plan.steps.len();
    format!(
        "migrating {} from {} to {} ({} migration{})",
        plan.direction,
        plan.from,
        plan.to,
        count,
        if count == 1 { "" } else { "s" }
    )
}

impl<W: Write> Reporter for TextReporter<W> {
    fn current_version(&mut self, version: &VersionId) {
        self.line(&format!("version of currently installed migration: {}", version));
    }

    fn planned(&mut self, plan: &Plan<'_>, dry_run: bool) {
        if plan.is_noop() {
            self.line("versions are equal, nothing to do");
            return;
        }
        self.line(&format_plan(plan));
        if dry_run {
            for step in &plan.steps {
                self.line(&format!(
                    "  would {} {}",
                    verb(plan.direction, false),
                    step.migration.label()
                ));
            }
        }
    }

    fn committed(&mut self, direction: Direction, step: &PlanStep<'_>) {
        self.line(&format!("{} {}", verb(direction, true), step.migration.label()));
    }

    fn finished(&mut self, report: &RunReport) {
        if report.direction == Direction::NoOp {
            return;
        }
        if report.dry_run {
            self.line("dry run, nothing executed");
        } else {
            self.line(&format!("database is now at version {}", report.version));
        }
    }
}
