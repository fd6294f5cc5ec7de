use crate::error::{ExecutionStep, RunnerError, StepError};
use crate::rollback_after_failure;
use crate::scanner::Manifest;
use core_types::{MigrationRecord, SavepointName};
use database::{DbError, RegistryStore};
use std::path::Path;

/// What one `execute` invocation applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Applied migrations in the order they ran.
    pub applied: Vec<MigrationRecord>,
}

/// Applies every pending migration in ascending `exec_order`.
///
/// The whole batch shares one transaction and each migration runs inside its
/// own savepoint. A failure rolls back the entire transaction, including
/// migrations that already succeeded in this batch, so the next run retries
/// all of them.
///
/// Callers must validate first; this function trusts the registry.
pub async fn execute<S: RegistryStore>(
    store: &mut S,
    manifest: &Manifest,
) -> Result<ExecutionSummary, RunnerError> {
    tracing::info!("Executing migrations");

    let pending = store.list_pending().await?;
    tracing::info!("Found {} unexecuted migrations", pending.len());
    if pending.is_empty() {
        return Ok(ExecutionSummary::default());
    }

    store.begin().await?;
    let mut applied = Vec::with_capacity(pending.len());

    for mut record in pending {
        let path = manifest.path_for(&record.filename);

        if let Err(source) = apply(store, &record, &path).await {
            tracing::error!(
                id = record.id,
                path = %path.display(),
                error = %source,
                "Failed executing migration; rolling back all changes"
            );
            rollback_after_failure(store).await;
            return Err(RunnerError::MigrationExecutionError {
                record,
                path,
                source,
            });
        }

        record.executed = true;
        applied.push(record);
    }

    store.commit().await?;
    tracing::info!(count = applied.len(), "Migrations executed.");
    Ok(ExecutionSummary { applied })
}

async fn apply<S: RegistryStore>(
    store: &mut S,
    record: &MigrationRecord,
    path: &Path,
) -> Result<(), StepError> {
    let db = |step: ExecutionStep| move |source: DbError| StepError::Database { step, source };

    let savepoint = SavepointName::from_filename(&record.filename);
    store
        .savepoint(&savepoint)
        .await
        .map_err(db(ExecutionStep::Savepoint))?;

    tracing::info!(path = %path.display(), "Executing migration");
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(StepError::Read)?;

    store
        .run_script(&body)
        .await
        .map_err(db(ExecutionStep::RunBody))?;
    store
        .mark_executed(record.id)
        .await
        .map_err(db(ExecutionStep::MarkExecuted))?;
    store
        .release_savepoint(&savepoint)
        .await
        .map_err(db(ExecutionStep::ReleaseSavepoint))?;

    Ok(())
}
