//! Configuration file parsing
//!
//! Reads mgx.toml configuration files.

use crate::output::Format;
use crate::store::{DEFAULT_TABLE, is_sql_identifier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "mgx.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub migrations: MigrationsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MigrationsConfig {
    /// Root directory scanned for migration files
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self { dir: default_dir() }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Table holding the applied version
    #[serde(default = "default_version_table")]
    pub version_table: String,

    /// Hold a database-level lock for the duration of a run
    #[serde(default = "default_lock")]
    pub lock: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            version_table: default_version_table(),
            lock: default_lock(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output format: "text" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("./migrations")
}

fn default_version_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_lock() -> bool {
    true
}

fn default_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, the form written by `mgx config`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The configured output format.
    pub fn format(&self) -> Result<Format, ConfigError> {
        Format::from_str(&self.output.format).map_err(|_| {
            ConfigError::Validation(format!(
                "invalid output format '{}'. Valid values: text, json",
                self.output.format
            ))
        })
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        let table = &self.database.version_table;
        if !is_sql_identifier(table) {
            return Err(ConfigError::Validation(format!(
                "invalid version_table '{}'. Expected a plain SQL identifier",
                table
            )));
        }
        self.format()?;
        Ok(())
    }
}
