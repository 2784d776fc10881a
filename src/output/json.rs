//! JSON output reporter
//!
//! Writes one pretty-printed JSON document per run: the final
//! [`RunReport`], or on failure a short document with the installed
//! version, the version stored afterwards, and the error message.

use crate::engine::RunReport;
use crate::error::MigrateError;
use crate::output::Reporter;
use crate::version::VersionId;
use serde::Serialize;
use std::io::Write;

/// Document written when a run fails.
#[derive(Debug, Serialize)]
struct FailureReport<'a> {
    /// Installed version read before planning; `null` if the run failed
    /// before reading it.
    from: Option<&'a VersionId>,
    /// Version stored when the run stopped.
    version: Option<&'a VersionId>,
    error: String,
}

pub struct JsonReporter<W> {
    out: W,
    current: Option<VersionId>,
    written: bool,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            current: None,
            written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write<T: Serialize>(&mut self, document: &T) {
        if self.written {
            return;
        }
        self.written = true;
        match serde_json::to_writer_pretty(&mut self.out, document) {
            Ok(()) => {
                let _ = writeln!(self.out);
            }
            Err(e) => tracing::warn!(error = %e, "could not write JSON report"),
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn current_version(&mut self, version: &VersionId) {
        self.current = Some(version.clone());
    }

    fn finished(&mut self, report: &RunReport) {
        self.write(report);
    }

    fn failed(&mut self, error: &MigrateError) {
        let current = self.current.take();
        let version = match error {
            MigrateError::Execution(e) => Some(&e.version),
            _ => current.as_ref(),
        };
        let document = FailureReport {
            from: current.as_ref(),
            version,
            error: error.to_string(),
        };
        self.write(&document);
    }
}
