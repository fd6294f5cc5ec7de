use crate::error::RunnerError;
use crate::rollback_after_failure;
use crate::scanner::Manifest;
use core_types::{MigrationFile, MigrationRecord};
use database::{DbError, RegistryStore};
use std::collections::HashSet;

/// What one `register` invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    /// Records inserted by this invocation, in insertion order.
    pub registered: Vec<MigrationRecord>,
    /// Local files that already had a record.
    pub already_registered: usize,
}

/// Registers every local file the registry does not know yet.
///
/// All inserts share one transaction. If a new file's order is already held
/// by another record, nothing from this invocation is kept.
pub async fn register<S: RegistryStore>(
    store: &mut S,
    manifest: &Manifest,
) -> Result<RegistrationSummary, RunnerError> {
    tracing::info!("Registering migrations");

    let known: HashSet<String> = store
        .list()
        .await?
        .into_iter()
        .map(|record| record.filename)
        .collect();

    let mut unregistered: Vec<&MigrationFile> = manifest
        .files()
        .iter()
        .filter(|file| !known.contains(&file.filename))
        .collect();
    unregistered.sort_by(|a, b| (a.exec_order, &a.filename).cmp(&(b.exec_order, &b.filename)));

    let already_registered = manifest.len() - unregistered.len();
    tracing::info!("Found {} unregistered migrations", unregistered.len());

    if unregistered.is_empty() {
        return Ok(RegistrationSummary {
            registered: Vec::new(),
            already_registered,
        });
    }

    store.begin().await?;
    let registered = match insert_all(store, &unregistered).await {
        Ok(registered) => registered,
        Err(InsertError::Runner(err)) => {
            rollback_after_failure(store).await;
            return Err(err);
        }
        Err(InsertError::Conflict { file, source }) => {
            rollback_after_failure(store).await;
            return Err(conflict(store, file, source).await);
        }
    };
    store.commit().await?;

    tracing::info!(count = registered.len(), "Migrations registered.");
    Ok(RegistrationSummary {
        registered,
        already_registered,
    })
}

/// Why inserting the new records stopped.
enum InsertError<'f> {
    /// The database rejected `file` on a unique key, usually because another
    /// runner registered a colliding record after this one listed the registry.
    Conflict {
        file: &'f MigrationFile,
        source: DbError,
    },
    Runner(RunnerError),
}

impl From<DbError> for InsertError<'_> {
    fn from(err: DbError) -> Self {
        InsertError::Runner(err.into())
    }
}

async fn insert_all<'f, S: RegistryStore>(
    store: &mut S,
    files: &[&'f MigrationFile],
) -> Result<Vec<MigrationRecord>, InsertError<'f>> {
    let mut registered = Vec::with_capacity(files.len());

    for &file in files {
        tracing::info!(path = %file.absolute_path.display(), "Registering migration");

        if let Some(existing) = store.find_by_order(file.exec_order).await? {
            tracing::error!(
                file = %file.filename,
                order = file.exec_order,
                registered_to = %existing.filename,
                id = existing.id,
                "Local migration order doesn't match database!"
            );
            return Err(InsertError::Runner(RunnerError::UniqueConstraintViolation {
                filename: file.filename.clone(),
                exec_order: file.exec_order,
                existing,
            }));
        }

        let record = match store.insert(&file.filename, file.exec_order).await {
            Ok(record) => record,
            Err(source @ DbError::UniqueViolation(_)) => {
                return Err(InsertError::Conflict { file, source });
            }
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(
            file = %record.filename,
            order = record.exec_order,
            id = record.id,
            "Inserted migration"
        );
        registered.push(record);
    }

    Ok(registered)
}

/// Resolves a unique-key rejection into the record that won, once the
/// aborted transaction has been rolled back and committed rows are visible.
async fn conflict<S: RegistryStore>(
    store: &mut S,
    file: &MigrationFile,
    source: DbError,
) -> RunnerError {
    let existing = match store.list().await {
        Ok(records) => records
            .into_iter()
            .find(|r| r.exec_order == file.exec_order || r.filename == file.filename),
        Err(e) => {
            tracing::warn!(error = %e, "Could not look up the conflicting registry record");
            None
        }
    };

    match existing {
        Some(existing) => {
            tracing::error!(
                file = %file.filename,
                order = file.exec_order,
                registered_to = %existing.filename,
                id = existing.id,
                "Migration was registered concurrently by another runner"
            );
            RunnerError::UniqueConstraintViolation {
                filename: file.filename.clone(),
                exec_order: file.exec_order,
                existing,
            }
        }
        None => source.into(),
    }
}

/// Forgets every registered migration. Objects created by migration bodies
/// are left in place.
pub async fn unregister<S: RegistryStore>(store: &mut S) -> Result<u64, RunnerError> {
    tracing::info!("Unregistering all migrations");

    store.begin().await?;
    let removed = match store.delete_all().await {
        Ok(removed) => removed,
        Err(err) => {
            rollback_after_failure(store).await;
            return Err(err.into());
        }
    };
    store.commit().await?;

    tracing::info!(removed, "Migrations unregistered.");
    Ok(removed)
}
