use crate::error::ConfigError;
use crate::settings::LogSettings;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the background log writer alive. Dropping it flushes pending lines,
/// so the binary must hold it until it exits.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global `tracing` subscriber described by `settings`.
///
/// `RUST_LOG` takes precedence over the configured level. With a log directory
/// configured, lines go to daily-rolling `<identifier>.<date>.log` files and are
/// mirrored to stdout when `mirror_stdout` is set; without one they go to
/// stdout only.
pub fn init_logging(settings: &LogSettings) -> Result<LogGuard, ConfigError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_directive()));

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            let appender = file_appender(dir, settings)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = (settings.mirror_stdout || settings.directory.is_none())
        .then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    Ok(LogGuard { _file: guard })
}

/// Daily-rolling log files in `dir`, keeping at most `max_files` of them.
fn file_appender(dir: &Path, settings: &LogSettings) -> Result<RollingFileAppender, ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::LogDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&settings.identifier)
        .filename_suffix("log")
        .max_log_files(settings.max_files.max(1))
        .build(dir)
        .map_err(|e| ConfigError::LoggingError(e.to_string()))
}
