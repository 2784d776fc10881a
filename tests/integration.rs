//! Integration tests for the migration engine.
//!
//! Each test builds a migrations directory (on disk or in memory), runs the
//! engine against a real SQLite connection or the in-memory database, and
//! checks both the reported outcome and the resulting database state.

use mgx::db::{DbError, MemoryDatabase, SqliteDatabase};
use mgx::error::MigrateError;
use mgx::executor::Phase;
use mgx::input::sql::MARKER;
use mgx::output::Silent;
use mgx::scaffold::ScaffoldError;
use mgx::{
    Database, Direction, DiskFs, MemoryFs, Migrator, Repository, Target, VersionId, VersionStore,
};
use std::path::Path;

fn migration(up: &str, down: &str) -> String {
    format!("{}\n{}\n{}\n", up, MARKER, down)
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dirs");
    }
    std::fs::write(path, contents).expect("write migration");
}

/// Three migrations spread over two directories.
fn users_repo(root: &Path) {
    write(
        root,
        "a1_create_users.sql",
        &migration(
            "CREATE TABLE users (id INTEGER PRIMARY KEY);",
            "DROP TABLE users;",
        ),
    );
    write(
        root,
        "users/a2_add_email.sql",
        &migration(
            "ALTER TABLE users ADD COLUMN email TEXT;\nCREATE INDEX users_email ON users (email);",
            "DROP INDEX users_email;\nALTER TABLE users DROP COLUMN email;",
        ),
    );
    write(
        root,
        "orders/a3_create_orders.sql",
        &migration(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users (id));",
            "DROP TABLE orders;",
        ),
    );
}

fn tables(db: &SqliteDatabase) -> Vec<String> {
    let conn = db.connection();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .expect("prepare");
    stmt.query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows")
}

fn sqlite_migrator(root: &Path) -> Migrator<DiskFs, SqliteDatabase> {
    let db = SqliteDatabase::in_memory().expect("open sqlite");
    Migrator::new(DiskFs::new(root), db)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

#[test]
fn test_sqlite_up_to_latest() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let mut migrator = sqlite_migrator(dir.path());

    let report = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("migrate");

    assert_eq!(report.direction, Direction::Up);
    assert_eq!(report.backend, "sqlite");
    let ids: Vec<&str> = report.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
    assert_eq!(report.version.as_str(), "a3");
    assert_eq!(tables(migrator.database()), vec!["mgr", "orders", "users"]);
}

#[test]
fn test_sqlite_partial_up_then_down_to_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let mut migrator = sqlite_migrator(dir.path());

    let a2 = Target::parse("a2").expect("target");
    let report = migrator.migrate(&a2, false, &mut Silent).expect("up to a2");
    assert_eq!(report.steps.len(), 2);
    assert_eq!(migrator.current_version().expect("read").as_str(), "a2");
    assert_eq!(tables(migrator.database()), vec!["mgr", "users"]);

    let zero = Target::parse("0").expect("target");
    let report = migrator.migrate(&zero, false, &mut Silent).expect("down");
    assert_eq!(report.direction, Direction::Down);
    let ids: Vec<&str> = report.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a2", "a1"]);
    assert!(migrator.current_version().expect("read").is_zero());
    assert_eq!(tables(migrator.database()), vec!["mgr"]);
}

#[test]
fn test_sqlite_second_run_is_noop() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let mut migrator = sqlite_migrator(dir.path());

    migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("first run");
    let again = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("second run");

    assert_eq!(again.direction, Direction::NoOp);
    assert!(again.steps.is_empty());
    assert_eq!(again.version.as_str(), "a3");
}

#[test]
fn test_sqlite_failure_rolls_back_and_halts() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    // Replace a2 with a script whose second statement fails.
    write(
        dir.path(),
        "users/a2_add_email.sql",
        &migration(
            "ALTER TABLE users ADD COLUMN email TEXT;\nINSERT INTO missing_table VALUES (1);",
            "ALTER TABLE users DROP COLUMN email;",
        ),
    );
    let mut migrator = sqlite_migrator(dir.path());

    let err = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    match &err {
        MigrateError::Execution(failure) => {
            assert_eq!(failure.id.as_str(), "a2");
            assert_eq!(failure.name, "add_email");
            assert_eq!(failure.phase, Phase::Script);
            assert_eq!(failure.version.as_str(), "a1");
        }
        other => panic!("Expected Execution error, got: {:?}", other),
    }

    // a1 stays committed; a2's first statement is rolled back; a3 never ran.
    assert_eq!(migrator.current_version().expect("read").as_str(), "a1");
    assert_eq!(tables(migrator.database()), vec!["mgr", "users"]);
    let columns: i64 = migrator
        .database()
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'email'",
            [],
            |row| row.get(0),
        )
        .expect("pragma");
    assert_eq!(columns, 0);
}

#[test]
fn test_sqlite_custom_version_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let store = VersionStore::new("schema_version").expect("store");
    let mut migrator = sqlite_migrator(dir.path()).with_store(store);

    migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("migrate");
    assert_eq!(
        tables(migrator.database()),
        vec!["orders", "schema_version", "users"]
    );
}

#[test]
fn test_sqlite_dry_run_creates_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let mut migrator = sqlite_migrator(dir.path());

    let report = migrator
        .migrate(&Target::Latest, true, &mut Silent)
        .expect("dry run");
    assert!(report.dry_run);
    assert_eq!(report.steps.len(), 3);
    assert!(tables(migrator.database()).is_empty());
}

#[test]
fn test_irreversible_down_touches_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    // Up-only: no marker line.
    write(
        dir.path(),
        "a4_seed.sql",
        "INSERT INTO users (id) VALUES (1);",
    );
    let mut migrator = sqlite_migrator(dir.path());
    migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("up");

    let err = migrator
        .migrate(&Target::parse("a1").expect("target"), false, &mut Silent)
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("a4 (seed)"), "got: {}", err);
    assert_eq!(migrator.current_version().expect("read").as_str(), "a4");
}

/// SQLite connection that lets a rival run go first when the first
/// migration transaction is about to open.
struct RacingDatabase {
    inner: SqliteDatabase,
    rival: Option<Box<dyn FnOnce()>>,
}

impl Database for RacingDatabase {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn version_table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        self.inner.version_table_exists(table)
    }

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError> {
        self.inner.ensure_version_table(table)
    }

    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError> {
        self.inner.read_versions(table)
    }

    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError> {
        self.inner.write_version(table, version)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        if let Some(rival) = self.rival.take() {
            rival();
        }
        self.inner.begin()
    }

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError> {
        self.inner.execute_script(sql)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.inner.rollback()
    }

    fn lock(&mut self) -> Result<(), DbError> {
        self.inner.lock()
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        self.inner.unlock()
    }
}

#[test]
fn test_sqlite_concurrent_runs_apply_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("migrations");
    let db_path = dir.path().join("app.db");
    write(
        &root,
        "a1_count_run.sql",
        &migration("INSERT INTO hits (n) VALUES (1);", "DELETE FROM hits;"),
    );

    let first = SqliteDatabase::open(&db_path).expect("open");
    first
        .connection()
        .execute_batch("CREATE TABLE hits (n INTEGER);")
        .expect("create hits");

    // The rival plans, applies and commits a1 while the first run sits
    // between planning and its first transaction.
    let rival_root = root.clone();
    let rival_path = db_path.clone();
    let racing = RacingDatabase {
        inner: first,
        rival: Some(Box::new(move || {
            let db = SqliteDatabase::open(&rival_path).expect("open rival");
            Migrator::new(DiskFs::new(rival_root), db)
                .migrate(&Target::Latest, false, &mut Silent)
                .expect("rival run");
        })),
    };

    let mut migrator = Migrator::new(DiskFs::new(&root), racing);
    let err = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .unwrap_err();
    match &err {
        MigrateError::Execution(e) => {
            assert_eq!(e.phase, Phase::VersionCheck);
            assert_eq!(e.id.as_str(), "a1");
            assert!(e.version.is_zero());
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert!(migrator.database().inner.connection().is_autocommit());

    let conn = rusqlite::Connection::open(&db_path).expect("open");
    let hits: i64 = conn
        .query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))
        .expect("count");
    assert_eq!(hits, 1);
    let stored: String = conn
        .query_row("SELECT ver FROM mgr", [], |row| row.get(0))
        .expect("version");
    assert_eq!(stored, "a1");
}

// ---------------------------------------------------------------------------
// In-memory fakes
// ---------------------------------------------------------------------------

fn memory_repo() -> MemoryFs {
    MemoryFs::new()
        .with_file("a1_one.sql", migration("UP a1", "DOWN a1"))
        .with_file("x/a2_two.sql", migration("UP a2", "DOWN a2"))
        .with_file("x/y/a3_three.sql", migration("UP a3", "DOWN a3"))
}

#[test]
fn test_failure_in_middle_never_attempts_later_steps() {
    let db = MemoryDatabase::new().fail_script("UP a2");
    let mut migrator = Migrator::new(memory_repo(), db);

    let err = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .unwrap_err();
    assert!(err.to_string().contains("a2 (two)"), "got: {}", err);

    let db = migrator.into_database();
    assert_eq!(db.version(), Some("a1"));
    assert_eq!(db.scripts(), ["UP a1"]);
    assert!(!db.is_locked());
}

#[test]
fn test_unknown_target_changes_nothing() {
    let mut migrator = Migrator::new(memory_repo(), MemoryDatabase::new().with_version("a1"));
    let err = migrator
        .migrate(&Target::parse("b9").expect("target"), false, &mut Silent)
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown migration version b9");
    assert_eq!(migrator.database().version(), Some("a1"));
    assert!(migrator.database().scripts().is_empty());
}

#[test]
fn test_corrupt_version_row_is_reported() {
    let db = MemoryDatabase::new().with_rows(vec![Some("a1".into()), Some("a2".into())]);
    let mut migrator = Migrator::new(memory_repo(), db);
    let err = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Store(mgx::store::StoreError::Corrupt { .. })
    ));
    assert!(!migrator.database().is_locked());
}

#[test]
fn test_stored_version_without_file_is_refused() {
    let mut migrator = Migrator::new(memory_repo(), MemoryDatabase::new().with_version("b5"));
    let err = migrator
        .migrate(&Target::Version(VersionId::zero()), false, &mut Silent)
        .unwrap_err();
    assert!(matches!(err, MigrateError::Plan(_)), "got: {:?}", err);
    assert_eq!(err.exit_code(), 2);
    assert_eq!(
        err.to_string(),
        "database is at version b5, which has no migration file"
    );
    assert_eq!(migrator.database().version(), Some("b5"));
    assert!(migrator.database().scripts().is_empty());
}

#[test]
fn test_duplicate_versions_are_fatal() {
    let fs = memory_repo().with_file("z/a2_again.sql", migration("UP", "DOWN"));
    let mut migrator = Migrator::new(fs, MemoryDatabase::new());
    let err = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .unwrap_err();
    assert!(matches!(err, MigrateError::Load(_)), "got: {:?}", err);
    assert_eq!(migrator.database().lock_count(), 0);
}

#[test]
fn test_rejected_files_do_not_block_a_run() {
    let fs = memory_repo()
        .with_file("notes.sql", "-- not a migration")
        .with_file("README.md", "ignored");
    let mut migrator = Migrator::new(fs, MemoryDatabase::new());
    let report = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("migrate");
    assert_eq!(report.steps.len(), 3);
    assert_eq!(
        migrator.repository().discover().expect("discover").rejected().len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Scaffolding
// ---------------------------------------------------------------------------

#[test]
fn test_create_then_discover() {
    let dir = tempfile::tempdir().expect("tempdir");
    users_repo(dir.path());
    let repository = Repository::new(DiskFs::new(dir.path()));
    let before = repository.discover().expect("discover");

    let path = repository.create("sub/name").expect("create");
    assert!(path.starts_with("sub"));

    let after = repository.discover().expect("discover");
    assert_eq!(after.len(), before.len() + 1);
    let created = after
        .migrations()
        .iter()
        .find(|m| m.path.ends_with(&path))
        .expect("created migration is discovered");
    assert_eq!(created.name, "name");
    assert!(
        before
            .migrations()
            .iter()
            .all(|m| created.id.is_newer_than(&m.id))
    );
    assert_eq!(after.latest(), Some(&created.id));
    assert_eq!(created.up, "");
    assert_eq!(created.down.as_deref(), Some(""));
}

#[test]
fn test_created_migration_runs_as_noop_script() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = Repository::new(DiskFs::new(dir.path()));
    repository.create("empty").expect("create");

    let mut migrator = sqlite_migrator(dir.path());
    let report = migrator
        .migrate(&Target::Latest, false, &mut Silent)
        .expect("migrate");
    assert_eq!(report.steps.len(), 1);
    assert!(!report.version.is_zero());
    assert_eq!(migrator.current_version().expect("read"), report.version);
}

#[test]
fn test_create_rejects_traversal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("migrations");
    let repository = Repository::new(DiskFs::new(&root));

    let err = repository.create("../evil").unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Scaffold(ScaffoldError::PathTraversal { .. })
    ));
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn test_versions_from_clock_sort_in_creation_order() {
    let repository = Repository::new(MemoryFs::new());
    let first = repository.create("first").expect("create");
    let second = repository.create("second").expect("create");

    let set = repository.discover().expect("discover");
    let names: Vec<&str> = set.migrations().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_ne!(first, second);
    assert!(set.migrations()[1].id.is_newer_than(&set.migrations()[0].id));
    assert!(!set.migrations()[0].id.is_newer_than(&VersionId::now()));
}
