use crate::validator::ValidationReport;
use core_types::{CoreError, MigrationRecord};
use database::DbError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The stage of applying a single migration at which something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStep {
    Savepoint,
    ReadBody,
    RunBody,
    MarkExecuted,
    ReleaseSavepoint,
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ExecutionStep::Savepoint => "creating savepoint",
            ExecutionStep::ReadBody => "reading migration file",
            ExecutionStep::RunBody => "running migration body",
            ExecutionStep::MarkExecuted => "marking migration executed",
            ExecutionStep::ReleaseSavepoint => "releasing savepoint",
        };
        f.write_str(step)
    }
}

/// The underlying failure of one migration step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("reading migration file: {0}")]
    Read(#[source] io::Error),

    #[error("{step}: {source}")]
    Database {
        step: ExecutionStep,
        #[source]
        source: DbError,
    },
}

impl StepError {
    pub fn step(&self) -> ExecutionStep {
        match self {
            StepError::Read(_) => ExecutionStep::ReadBody,
            StepError::Database { step, .. } => *step,
        }
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Invalid path to migrations '{}': {source}", .path.display())]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    InvalidFile(#[from] CoreError),

    #[error("Failed to initialise the migration registry: {0}")]
    RegistryInitError(#[source] DbError),

    #[error(
        "Invalid state found: {} error(s), {} warning(s)",
        .0.error_count(),
        .0.warning_count()
    )]
    ValidationError(ValidationReport),

    #[error(
        "Local migration order doesn't match the registry: '{filename}' has order {exec_order}, already registered to '{}' (id {})",
        .existing.filename,
        .existing.id
    )]
    UniqueConstraintViolation {
        filename: String,
        exec_order: i32,
        existing: MigrationRecord,
    },

    #[error(
        "Failed executing migration #{} ({}): {source}",
        .record.id,
        .path.display()
    )]
    MigrationExecutionError {
        record: MigrationRecord,
        path: PathBuf,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}
