//! Plan execution
//!
//! Each plan step runs in its own transaction: the script and the version
//! bookkeeping commit together or not at all. The first failure rolls back
//! its transaction and halts the run, so the stored version always names
//! the last migration that fully committed.
//!
//! Inside each transaction the stored version is read back before the
//! script runs. If another run moved it since the plan was built, the step
//! fails in [`Phase::VersionCheck`] and nothing is applied twice.

use crate::db::{Database, DbError};
use crate::input::Migration;
use crate::plan::{Direction, Plan, PlanStep};
use crate::store::{StoreError, VersionStore};
use crate::version::VersionId;
use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};
use thiserror::Error;

/// Where in a step's transaction a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Begin,
    VersionCheck,
    Script,
    VersionRecord,
    Commit,
}

#[derive(Debug, Error)]
#[error("migration {id} ({name}) failed during {phase}: {source}")]
pub struct ExecutionError {
    pub id: VersionId,
    pub name: String,
    pub phase: Phase,
    #[source]
    pub source: DbError,
    /// Set when rolling back the failed transaction also failed.
    pub rollback_error: Option<DbError>,
    /// Version stored after the failure: the last committed step, or the
    /// version the run started from.
    pub version: VersionId,
    /// Steps that committed before the failure.
    pub completed: usize,
}

pub struct Executor<'s> {
    store: &'s VersionStore,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s VersionStore) -> Self {
        Self { store }
    }

    /// Run every step of `plan` in order. Returns the final stored version.
    ///
    /// The version table must already exist; see [`VersionStore::ensure`].
    /// `on_commit` is called after each step commits.
    pub fn run<D: Database + ?Sized>(
        &self,
        db: &mut D,
        plan: &Plan<'_>,
        on_commit: &mut dyn FnMut(Direction, &PlanStep<'_>),
    ) -> Result<VersionId, ExecutionError> {
        let mut version = plan.from.clone();

        for (idx, step) in plan.steps.iter().enumerate() {
            let migration = step.migration;
            let script = match plan.direction {
                Direction::Down => migration.down.as_deref().unwrap_or_default(),
                _ => migration.up.as_str(),
            };

            tracing::info!(
                id = %migration.id,
                name = %migration.name,
                direction = %plan.direction,
                "running migration"
            );

            if let Err((phase, source, rollback_error)) = self.apply(db, step, &version, script) {
                tracing::error!(
                    id = %migration.id,
                    name = %migration.name,
                    %phase,
                    error = %source,
                    "migration failed, rolled back"
                );
                return Err(failure(migration, phase, source, rollback_error, version, idx));
            }

            version = step.record.clone();
            tracing::debug!(id = %migration.id, version = %version, "committed");
            on_commit(plan.direction, step);
        }

        Ok(version)
    }

    /// One transaction: begin, version check, script, version record, commit.
    fn apply<D: Database + ?Sized>(
        &self,
        db: &mut D,
        step: &PlanStep<'_>,
        expected: &VersionId,
        script: &str,
    ) -> Result<(), (Phase, DbError, Option<DbError>)> {
        db.begin().map_err(|e| (Phase::Begin, e, None))?;

        self.script_and_record(db, step, expected, script)
            .map_err(|(phase, source)| (phase, source, db.rollback().err()))
    }

    fn script_and_record<D: Database + ?Sized>(
        &self,
        db: &mut D,
        step: &PlanStep<'_>,
        expected: &VersionId,
        script: &str,
    ) -> Result<(), (Phase, DbError)> {
        let stored = self.store.read(db).map_err(|e| {
            let source = match e {
                StoreError::Db(source) => source,
                other => DbError::new(other.to_string()),
            };
            (Phase::VersionCheck, source)
        })?;
        if &stored != expected {
            return Err((
                Phase::VersionCheck,
                DbError::new(format!(
                    "stored version is {}, expected {}; another run changed the database",
                    stored, expected
                )),
            ));
        }

        if !script.trim().is_empty() {
            db.execute_script(script).map_err(|e| (Phase::Script, e))?;
        }
        self.store
            .write(db, &step.record)
            .map_err(|e| (Phase::VersionRecord, e))?;
        db.commit().map_err(|e| (Phase::Commit, e))
    }
}

fn failure(
    migration: &Migration,
    phase: Phase,
    source: DbError,
    rollback_error: Option<DbError>,
    version: VersionId,
    completed: usize,
) -> ExecutionError {
    ExecutionError {
        id: migration.id.clone(),
        name: migration.name.clone(),
        phase,
        source,
        rollback_error,
        version,
        completed,
    }
}
