//! PostgreSQL backend on the synchronous `postgres` client.

use crate::db::{Database, DbError};
use ::postgres::{Client, NoTls};

/// Advisory lock key shared by every mgx run against a database.
pub const ADVISORY_LOCK_KEY: i64 = 0x6d67_785f_6c6f_636b;

pub struct PostgresDatabase {
    client: Client,
}

impl PostgresDatabase {
    /// Connect with a `key=value` DSN or a `postgres://` URL.
    pub fn connect(params: &str) -> Result<Self, DbError> {
        let client = Client::connect(params, NoTls)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Database for PostgresDatabase {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn version_table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        let row = self
            .client
            .query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&table])?;
        Ok(row.try_get(0)?)
    }

    fn ensure_version_table(&mut self, table: &str) -> Result<(), DbError> {
        self.client
            .batch_execute(&format!("CREATE TABLE IF NOT EXISTS {} (ver TEXT)", table))?;
        Ok(())
    }

    fn read_versions(&mut self, table: &str) -> Result<Vec<Option<String>>, DbError> {
        let rows = self
            .client
            .query(&format!("SELECT ver FROM {}", table), &[])?;
        rows.iter()
            .map(|row| row.try_get::<_, Option<String>>(0).map_err(DbError::from))
            .collect()
    }

    fn write_version(&mut self, table: &str, version: &str) -> Result<(), DbError> {
        self.client.execute(&format!("DELETE FROM {}", table), &[])?;
        self.client.execute(
            &format!("INSERT INTO {} (ver) VALUES ($1)", table),
            &[&version],
        )?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("BEGIN")?;
        Ok(())
    }

    fn execute_script(&mut self, sql: &str) -> Result<(), DbError> {
        self.client.batch_execute(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), DbError> {
        self.client
            .execute("SELECT pg_advisory_lock($1)", &[&ADVISORY_LOCK_KEY])?;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        self.client
            .execute("SELECT pg_advisory_unlock($1)", &[&ADVISORY_LOCK_KEY])?;
        Ok(())
    }
}
