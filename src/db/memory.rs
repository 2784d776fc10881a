//! In-memory stand-in for a database connection.
//!
//! Scripts are not interpreted; they are recorded. Transactions buffer
//! recorded scripts and version writes until commit, and failures can be
//! injected per script fragment or per phase.

use crate::db::{Database, DbError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct State {
    /// `None` while the version table does not exist.
    versions: Option<Vec<Option<String>>>,
    scripts: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    committed: State,
    pending: Option<State>,
    failing_scripts: Vec<String>,
    fail_ensure: bool,
    fail_version_write: bool,
    fail_commit: bool,
    /// Committed by "another client" when the next transaction opens.
    concurrent_version: Option<String>,
    locked: bool,
    lock_count: usize,
    commits: usize,
    rollbacks: usize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a version table holding `version`.
    pub fn with_version(mut self, version: &str) -> Self {
        self.committed.versions = Some(vec![Some(version.to_string())]);
        self
    }

    /// Start with a version table holding exactly these rows.
    pub fn with_rows(mut self, rows: Vec<Option<String>>) -> Self {
        self.committed.versions = Some(rows);
        self
    }

    /// Fail any script containing `fragment`.
    pub fn fail_script(mut self, fragment: &str) -> Self {
        self.failing_scripts.push(fragment.to_string());
        self
    }

    pub fn fail_ensure(mut self) -> Self {
        self.fail_ensure = true;
        self
    }

    /// Commit `version` from another client just before the next
    /// transaction opens.
    pub fn concurrent_write(mut self, version: &str) -> Self {
        self.concurrent_version = Some(version.to_string());
        self
    }

    pub fn fail_version_write(mut self) -> Self {
        self.fail_version_write = true;
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Committed version rows, or `None` if the table was never created.
    pub fn versions(&self) -> Option<&[Option<String>]> {
        self.committed.versions.as_deref()
    }

    /// The single committed version, if exactly one non-null row exists.
    pub fn version(&self) -> Option<&str> {
        match self.versions() {
            Some([Some(v)]) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Scripts whose transactions committed, in order.
    pub fn scripts(&self) -> &[String] {
        &self.committed.scripts
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_count(&self) -> usize {
        self.lock_count
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn state_mut(&mut self) -> &mut State {
        match self.pending.as_mut() {
            Some(pending) => pending,
            None => &mut self.committed,
        }
    }

    fn state(&self) -> &State {
        self.pending.as_ref().unwrap_or(&self.committed)
    }
}

impl Database for MemoryDatabase {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn version_table_exists(&mut self, _table: &str) -> Result<bool, DbError> {
        Ok(self.state().versions.is_some())
    }

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError> {
        if self.fail_ensure {
            return Err(DbError::new(format!("permission denied to create \"{}\"", table)));
        }
        let state = self.state_mut();
        if state.versions.is_none() {
            state.versions = Some(Vec::new());
        }
        Ok(())
    }

    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError> {
        self.state()
            .versions
            .clone()
            .ok_or_else(|| DbError::new(format!("relation \"{}\" does not exist", table)))
    }

    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError> {
        if self.fail_version_write {
            return Err(DbError::new("version write failed"));
        }
        let state = self.state_mut();
        match state.versions.as_mut() {
            Some(rows) => {
                *rows = vec![Some(version.to_string())];
                Ok(())
            }
            None => Err(DbError::new(format!("relation \"{}\" does not exist", table))),
        }
    }

    fn begin(&mut self) -> Result<(), DbError> {
        if self.pending.is_some() {
            return Err(DbError::new("transaction already open"));
        }
        if let Some(version) = self.concurrent_version.take() {
            self.committed.versions = Some(vec![Some(version)]);
        }
        self.pending = Some(self.committed.clone());
        Ok(())
    }

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError> {
        if let Some(fragment) = self.failing_scripts.iter().find(|f| sql.contains(f.as_str())) {
            return Err(DbError::new(format!("script failed at '{}'", fragment)));
        }
        self.state_mut().scripts.push(sql.to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if self.fail_commit {
            return Err(DbError::new("commit failed"));
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| DbError::new("no transaction open"))?;
        self.committed = pending;
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.pending
            .take()
            .ok_or_else(|| DbError::new("no transaction open"))?;
        self.rollbacks += 1;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), DbError> {
        if self.locked {
            return Err(DbError::new("lock already held"));
        }
        self.locked = true;
        self.lock_count += 1;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        if !self.locked {
            return Err(DbError::new("lock not held"));
        }
        self.locked = false;
        Ok(())
    }
}
