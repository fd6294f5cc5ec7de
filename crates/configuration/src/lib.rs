//! # Migrator Configuration Crate
//!
//! Loads the runtime settings of the migration runner and installs the
//! process-wide `tracing` subscriber.
//!
//! Settings are layered, lowest priority first:
//! 1. Built-in defaults and `DATABASE_URL`.
//! 2. An optional TOML file (`migrator.toml` unless told otherwise).
//! 3. `MIGRATOR__SECTION__KEY` environment variables.
//!
//! The `POSTGRES_*` variables then fill connection fields that are still unset,
//! but only for settings without a `url`.
//!
//! Command-line flags are applied on top by the binary.

use crate::error::ConfigError;
use std::env;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::{LogGuard, init_logging};
pub use settings::{DatabaseSettings, LogLevel, LogSettings, Settings};

/// Default settings file, looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "migrator.toml";

/// Environment variables shared with the application's own database setup.
const POSTGRES_USER: &str = "POSTGRES_USER";
const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
const POSTGRES_HOST: &str = "POSTGRES_HOST";
const POSTGRES_DB: &str = "POSTGRES_DB";

/// Loads the application settings.
///
/// `path` names a TOML file that must exist. Without it, `migrator.toml` is
/// read if present, so the runner can be driven purely from the environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("database.max_connections", 2_i64)?
        .set_default("database.acquire_timeout_secs", 5_i64)?
        .set_default("logging.level", "debug")?
        .set_default("logging.identifier", "migrations")?
        .set_default("logging.mirror_stdout", true)?
        .set_default("logging.max_files", 3_i64)?;

    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_default("database.url", url)?;
    }

    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let mut settings = builder
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("MIGRATOR")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Settings>()?;

    apply_postgres_env(&mut settings.database, |var| env::var(var).ok());
    Ok(settings)
}

/// Fills unset connection fields from the `POSTGRES_*` variables.
///
/// These are the lowest-priority source and only describe a connection that
/// has no `url`; an explicit URL is never redirected by them.
pub fn apply_postgres_env(
    database: &mut DatabaseSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if database.url.is_some() {
        return;
    }

    let fields = [
        (&mut database.username, POSTGRES_USER),
        (&mut database.password, POSTGRES_PASSWORD),
        (&mut database.host, POSTGRES_HOST),
        (&mut database.database, POSTGRES_DB),
    ];
    for (field, var) in fields {
        if field.is_none() {
            *field = lookup(var);
        }
    }
}
