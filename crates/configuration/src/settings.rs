use serde::Deserialize;
use std::path::PathBuf;

/// The root settings structure for the migration runner.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub logging: LogSettings,
}

/// How to reach the PostgreSQL instance holding the migration registry.
///
/// Every connection field is optional. Present fields are layered onto `url`
/// when it is set, otherwise onto libpq's own defaults (`PGHOST`, `PGUSER`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    /// A full `postgres://` connection string.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name of the database to migrate.
    pub database: Option<String>,
    /// The runner only ever holds one connection at a time.
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: LogLevel,
    /// Root folder for log files. Logs only go to stdout when unset.
    pub directory: Option<PathBuf>,
    /// Base name of the log file inside `directory`.
    pub identifier: String,
    /// Also write log lines to stdout when a log directory is in use.
    pub mirror_stdout: bool,
    /// Number of daily log files kept; older ones are deleted on rollover.
    pub max_files: usize,
}

/// Log verbosity. `Fatal` is kept for compatibility with older invocations and
/// behaves like `Error`, since `tracing` has no separate fatal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}
