use crate::error::RunnerError;
use crate::executor::{self, ExecutionSummary};
use crate::registrar::{self, RegistrationSummary};
use crate::scanner::Manifest;
use crate::validator::{self, ValidationReport};
use database::{DbManager, RegistryStore};
use std::fmt;

/// The operation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Action {
    /// Report drift between local files and the registry.
    Validate,
    /// Record local files the registry does not know yet.
    Register,
    /// Validate, then apply every pending migration.
    Execute,
    /// Delete every registry record.
    Unregister,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Action::Validate => "validate",
            Action::Register => "register",
            Action::Execute => "execute",
            Action::Unregister => "unregister",
        };
        f.write_str(action)
    }
}

/// The successful result of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Validated(ValidationReport),
    Registered(RegistrationSummary),
    Executed(ExecutionSummary),
    Unregistered { removed: u64 },
}

/// Runs actions against the registry for one scanned migrations directory.
pub struct Dispatcher<'a, M: DbManager> {
    manager: &'a M,
    manifest: &'a Manifest,
}

impl<'a, M: DbManager> Dispatcher<'a, M> {
    pub fn new(manager: &'a M, manifest: &'a Manifest) -> Self {
        Self { manager, manifest }
    }

    /// Runs `action` on a freshly acquired connection.
    ///
    /// The registry table is created first if needed. The connection is
    /// released whether or not the action succeeds.
    pub async fn handle(&self, action: Action) -> Result<Outcome, RunnerError> {
        tracing::info!("Handling action: '{action}'");

        let mut store = self.manager.acquire().await?;
        let result = self.run(&mut store, action).await;
        self.manager.release(store).await;

        result
    }

    async fn run(&self, store: &mut M::Store, action: Action) -> Result<Outcome, RunnerError> {
        store.init().await.map_err(RunnerError::RegistryInitError)?;

        match action {
            Action::Validate => {
                let report = validator::check(store, self.manifest).await?;
                if !report.is_valid() {
                    return Err(RunnerError::ValidationError(report));
                }
                Ok(Outcome::Validated(report))
            }
            Action::Register => registrar::register(store, self.manifest)
                .await
                .map(Outcome::Registered),
            Action::Execute => {
                // Unregistered files would be silently skipped, so they block
                // execution even though they are only warnings on their own.
                let report = validator::check(store, self.manifest).await?;
                if !report.is_executable() {
                    tracing::error!("Validation failed, not executing migrations");
                    return Err(RunnerError::ValidationError(report));
                }
                executor::execute(store, self.manifest)
                    .await
                    .map(Outcome::Executed)
            }
            Action::Unregister => registrar::unregister(store)
                .await
                .map(|removed| Outcome::Unregistered { removed }),
        }
    }
}
