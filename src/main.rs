//! mgx CLI
//!
//! Entry point for the command-line tool.
//!
//! Exit codes:
//! - 0: Success, including runs with nothing to do and dry runs
//! - 1: A migration failed while executing; it was rolled back
//! - 2: Tool error (arguments, config, connection, filesystem, unknown version, etc.)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use mgx::config::DEFAULT_CONFIG_FILE;
use mgx::error::EXIT_TOOL_ERROR;
use mgx::output::{Format, stdout_reporter};
use mgx::{
    Config, ConnectionTarget, Database, DiskFs, MigrateError, Migrator, Repository, Target,
    VersionStore,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "MGX_LOG";

#[derive(Parser, Debug)]
#[command(name = "mgx")]
#[command(about = "Versioned SQL schema migrations for PostgreSQL and SQLite", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty migration file
    Create {
        /// Path under the migrations directory, e.g. users/add_email
        path: String,
    },

    /// Migrate the database to a version ("latest", "0" or a migration version)
    Migrate {
        /// Target version
        version: String,

        /// PostgreSQL connection string (key=value form)
        #[arg(short = 'D', long, env = "MGX_DSN")]
        dsn: Option<String>,

        /// PostgreSQL URL, or sqlite:<path> / sqlite::memory:
        #[arg(short = 'U', long, env = "MGX_URL")]
        url: Option<String>,

        /// Print the plan without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Override output format (text, json)
        #[arg(long)]
        format: Option<Format>,
    },

    /// Write a default configuration file
    Config,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<MigrateError>()
            .map_or(EXIT_TOOL_ERROR, MigrateError::exit_code);
        std::process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("mgx=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("mgx=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Config => write_default_config(args.config.as_deref()),
        Command::Create { path } => {
            let config = load_config(&args.config)?;
            create(&config, &path)
        }
        Command::Migrate {
            version,
            dsn,
            url,
            dry_run,
            format,
        } => {
            let config = load_config(&args.config)?;
            let format = match format {
                Some(format) => format,
                None => config.format()?,
            };
            migrate(&config, &version, dsn, url, dry_run, format)
        }
    }
}

fn create(config: &Config, path: &str) -> Result<()> {
    let repository = Repository::new(DiskFs::new(&config.migrations.dir));
    let created = repository
        .create(path)
        .with_context(|| format!("Failed to create migration '{}'", path))?;

    println!("{}", config.migrations.dir.join(created).display());
    Ok(())
}

fn migrate(
    config: &Config,
    version: &str,
    dsn: Option<String>,
    url: Option<String>,
    dry_run: bool,
    format: Format,
) -> Result<()> {
    let target = Target::parse(version).map_err(MigrateError::from)?;
    let connection = ConnectionTarget::from_flags(dsn, url).map_err(MigrateError::Argument)?;
    let store = VersionStore::new(&config.database.version_table).map_err(MigrateError::from)?;

    let db = connection
        .connect()
        .map_err(|source| MigrateError::Connection {
            kind: connection.kind(),
            source,
        })?;
    tracing::debug!(backend = db.backend(), "connected");

    let mut reporter = stdout_reporter(format);
    let mut migrator = Migrator::new(DiskFs::new(&config.migrations.dir), db)
        .with_store(store)
        .with_lock(config.database.lock);

    migrator.migrate(&target, dry_run, reporter.as_mut())?;
    Ok(())
}

/// Write the default configuration, refusing to replace an existing file.
fn write_default_config(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    let contents = Config::default()
        .to_toml()
        .context("Failed to render default configuration")?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create config file {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write config file {}", path.display()))?;

    println!("{}", path.display());
    Ok(())
}

/// Load configuration from file.
///
/// If `config_path` is `Some`, the user explicitly passed `--config` and the file
/// must exist (error if not found). If `None`, the default config path is used;
/// a missing default config file is not an error (falls back to defaults with a warning).
fn load_config(config_path: &Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => {
            // User explicitly provided --config; file must exist.
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::from_file(path).context("Failed to load configuration")
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Config::from_file(&default_path).context("Failed to load configuration")
            } else {
                tracing::warn!(
                    "Config file {} not found, using defaults",
                    default_path.display()
                );
                Ok(Config::default())
            }
        }
    }
}
