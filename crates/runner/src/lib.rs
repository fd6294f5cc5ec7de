//! # Migrator Runner Crate
//!
//! Reconciles the numbered migration files in a directory with the
//! `migration` registry table and applies pending migrations exactly once, in
//! order, inside a single transaction per run.
//!
//! ## Components
//!
//! - `scanner`: directory → `Manifest` of `MigrationFile`s.
//! - `validator`: manifest × registry → `ValidationReport` (drift findings).
//! - `registrar`: inserts records for files the registry has not seen yet.
//! - `executor`: runs pending migration bodies, one savepoint each.
//! - `dispatcher`: runs one `Action` on one connection and always releases it.
//!
//! The runner is generic over `database::DbManager`, so it never knows which
//! backend it is talking to.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod registrar;
pub mod scanner;
pub mod validator;

pub use dispatcher::{Action, Dispatcher, Outcome};
pub use error::{ExecutionStep, RunnerError, StepError};
pub use executor::ExecutionSummary;
pub use registrar::RegistrationSummary;
pub use scanner::{Manifest, scan};
pub use validator::{Finding, Severity, ValidationReport, validate};

use database::RegistryStore;

/// Rolls back the open transaction after a failed step. The step's error is
/// what gets reported, so a rollback failure is only logged.
pub(crate) async fn rollback_after_failure<S: RegistryStore>(store: &mut S) {
    match store.rollback().await {
        Ok(()) => tracing::warn!("Transaction rolled back"),
        Err(e) => tracing::error!(error = %e, "Rollback failed"),
    }
}
