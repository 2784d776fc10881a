//! Migration engine
//!
//! [`Repository`] owns the migrations directory: discovery and scaffolding.
//! [`Migrator`] pairs a repository with one database connection and drives a
//! run: lock, read the stored version, plan, execute, unlock.

use crate::db::Database;
use crate::error::MigrateError;
use crate::executor::Executor;
use crate::input::sql::SqlLoader;
use crate::input::{Filesystem, LoadError, MigrationSet};
use crate::output::Reporter;
use crate::plan::{self, Direction, Plan, Target};
use crate::scaffold;
use crate::store::{StoreError, VersionStore};
use crate::version::VersionId;
use serde::Serialize;
use std::path::PathBuf;

/// The migrations directory behind a [`Filesystem`].
pub struct Repository<F> {
    fs: F,
    loader: SqlLoader,
}

impl<F: Filesystem> Repository<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            loader: SqlLoader::new(),
        }
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// Scan and parse every migration file.
    pub fn discover(&self) -> Result<MigrationSet, LoadError> {
        self.loader.load(&self.fs)
    }

    /// Scaffold a new migration at `relative`, returning its path.
    ///
    /// The new version is the current time, bumped past the newest
    /// discovered migration if the clock would not sort after it.
    pub fn create(&self, relative: &str) -> Result<PathBuf, MigrateError> {
        scaffold::check_path(relative)?;

        let set = self.discover()?;
        let mut id = VersionId::now();
        if let Some(latest) = set.latest() {
            if !id.is_newer_than(latest) {
                tracing::debug!(%latest, clock = %id, "clock behind newest migration");
                id = latest.successor();
            }
        }

        Ok(scaffold::create(&self.fs, relative, &id)?)
    }
}

/// Outcome of one step in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: VersionId,
    pub name: String,
    pub path: PathBuf,
    /// Version stored once this step commits.
    pub record: VersionId,
    pub applied: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub target: String,
    pub from: VersionId,
    pub to: VersionId,
    pub direction: Direction,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
    /// Version stored when the run ended.
    pub version: VersionId,
}

impl RunReport {
    fn new(backend: &'static str, target: &Target, plan: &Plan<'_>, dry_run: bool) -> Self {
        Self {
            backend,
            target: target.to_string(),
            from: plan.from.clone(),
            to: plan.to.clone(),
            direction: plan.direction,
            dry_run,
            steps: plan
                .steps
                .iter()
                .map(|step| StepReport {
                    id: step.migration.id.clone(),
                    name: step.migration.name.clone(),
                    path: step.migration.path.clone(),
                    record: step.record.clone(),
                    applied: false,
                })
                .collect(),
            version: plan.from.clone(),
        }
    }
}

/// Runs migrations from a repository against one database connection.
pub struct Migrator<F, D> {
    repository: Repository<F>,
    db: D,
    store: VersionStore,
    lock: bool,
}

impl<F: Filesystem, D: Database> Migrator<F, D> {
    pub fn new(fs: F, db: D) -> Self {
        Self {
            repository: Repository::new(fs),
            db,
            store: VersionStore::default(),
            lock: true,
        }
    }

    pub fn with_store(mut self, store: VersionStore) -> Self {
        self.store = store;
        self
    }

    /// Enable or disable the run-wide database lock.
    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn repository(&self) -> &Repository<F> {
        &self.repository
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_database(self) -> D {
        self.db
    }

    /// The version currently recorded in the database.
    pub fn current_version(&mut self) -> Result<VersionId, MigrateError> {
        Ok(self.store.read(&mut self.db)?)
    }

    /// Move the database to `target`.
    ///
    /// With `dry_run` the plan is computed and reported but nothing is
    /// executed, locked, or created. Errors are passed to
    /// [`Reporter::failed`] before being returned.
    pub fn migrate(
        &mut self,
        target: &Target,
        dry_run: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<RunReport, MigrateError> {
        let result = self.migrate_locked(target, dry_run, reporter);
        if let Err(err) = &result {
            reporter.failed(err);
        }
        result
    }

    fn migrate_locked(
        &mut self,
        target: &Target,
        dry_run: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<RunReport, MigrateError> {
        let set = self.repository.discover()?;
        tracing::info!(
            migrations = set.len(),
            rejected = set.rejected().len(),
            "discovered migrations"
        );

        let locked = self.lock && !dry_run;
        if locked {
            self.db.lock().map_err(|source| MigrateError::Lock {
                action: "acquire",
                source,
            })?;
            tracing::debug!(backend = self.db.backend(), "acquired migration lock");
        }

        let result = self.run(&set, target, dry_run, reporter);

        if locked {
            match (self.db.unlock(), &result) {
                (Ok(()), _) => tracing::debug!("released migration lock"),
                (Err(source), Ok(_)) => {
                    return Err(MigrateError::Lock {
                        action: "release",
                        source,
                    });
                }
                (Err(source), Err(_)) => {
                    tracing::warn!(error = %source, "could not release the migration lock");
                }
            }
        }

        result
    }

    fn run(
        &mut self,
        set: &MigrationSet,
        target: &Target,
        dry_run: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<RunReport, MigrateError> {
        let current = self.store.read(&mut self.db)?;
        tracing::info!(%current, "version of currently installed migration");
        reporter.current_version(&current);

        let plan = plan::build(&current, target, set)?;
        tracing::info!(
            direction = %plan.direction,
            from = %plan.from,
            to = %plan.to,
            steps = plan.steps.len(),
            dry_run,
            "planned"
        );
        reporter.planned(&plan, dry_run);

        let mut report = RunReport::new(self.db.backend(), target, &plan, dry_run);
        if !dry_run && !plan.steps.is_empty() {
            self.store.ensure(&mut self.db).map_err(StoreError::Db)?;
            report.version = Executor::new(&self.store).run(
                &mut self.db,
                &plan,
                &mut |direction, step| reporter.committed(direction, step),
            )?;
            for step in &mut report.steps {
                step.applied = true;
            }
        }

        reporter.finished(&report);
        Ok(report)
    }
}
