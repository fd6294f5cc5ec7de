use anyhow::Context;
use clap::Parser;
use configuration::{LogGuard, LogLevel, Settings, init_logging, load_settings};
use database::{DbManager, PgManager, connect};
use runner::{Action, Dispatcher, Outcome, RunnerError, scan};
use std::path::PathBuf;
use std::process::ExitCode;

/// The main entry point for the migration runner.
#[tokio::main]
async fn main() -> ExitCode {
    // Load POSTGRES_* and DATABASE_URL from a .env file when one is present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let (settings, _log_guard) = match setup(&cli) {
        Ok(setup) => setup,
        Err(e) => {
            // No logger is installed yet.
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Registers, validates and applies numbered SQL migrations.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local folder where migrations are stored.
    #[arg(short = 'm', long = "migrations", value_name = "FOLDER")]
    migrations: PathBuf,

    /// Action to be executed.
    #[arg(short = 'a', long = "action", value_enum)]
    action: Action,

    /// Optional database host to run migrations against.
    #[arg(short = 'H', long = "host", env = "DB_HOST")]
    host: Option<String>,

    /// Root folder for log files.
    #[arg(short = 'l', long = "log", value_name = "DIR")]
    log: Option<PathBuf>,

    /// Level of log output.
    #[arg(long = "log-level", value_enum)]
    log_level: Option<LogLevel>,

    /// Settings file. Defaults to `migrator.toml` in the working directory.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

// ==============================================================================
// Action Orchestration
// ==============================================================================

/// Loads the settings, applies CLI overrides and installs the logger.
fn setup(cli: &Cli) -> anyhow::Result<(Settings, LogGuard)> {
    let mut settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(host) = &cli.host {
        settings.database.host = Some(host.clone());
    }
    if let Some(dir) = &cli.log {
        settings.logging.directory = Some(dir.clone());
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    let guard = init_logging(&settings.logging).context("Failed to initialise logging")?;
    Ok((settings, guard))
}

/// Scans the migrations, connects, and dispatches the requested action.
async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    // Without a readable manifest no action can proceed, so fail before connecting.
    let manifest = scan(&cli.migrations).inspect_err(|_| {
        tracing::error!("Invalid path to migrations: {}", cli.migrations.display());
    })?;
    tracing::info!(
        dir = %manifest.dir().display(),
        count = manifest.len(),
        "Loaded migration files"
    );

    let pool = connect(&settings.database)
        .await
        .context("Failed to connect to the database")?;
    let manager = PgManager::new(pool);

    let result = Dispatcher::new(&manager, &manifest).handle(cli.action).await;
    manager.end().await;

    let outcome = result.inspect_err(report_failure)?;
    report_success(&outcome);
    Ok(())
}

fn report_success(outcome: &Outcome) {
    match outcome {
        Outcome::Validated(report) => {
            tracing::info!(warnings = report.warning_count(), "Validation passed");
        }
        Outcome::Registered(summary) => tracing::info!(
            registered = summary.registered.len(),
            already_registered = summary.already_registered,
            "Registration complete"
        ),
        Outcome::Executed(summary) => {
            tracing::info!(applied = summary.applied.len(), "Execution complete");
        }
        Outcome::Unregistered { removed } => {
            tracing::info!(removed, "Registry cleared");
        }
    }
}

fn report_failure(err: &RunnerError) {
    match err {
        RunnerError::MigrationExecutionError { record, path, .. } => tracing::error!(
            id = record.id,
            order = record.exec_order,
            path = %path.display(),
            "Failed executing query for migration; all changes of this run were rolled back"
        ),
        RunnerError::UniqueConstraintViolation { .. } => {
            tracing::error!("Registration rolled back; the registry is unchanged")
        }
        _ => {}
    }
}
