use crate::error::DbError;
use async_trait::async_trait;
use core_types::{MigrationRecord, SavepointName};

/// Name of the registry table. Spliced into SQL text, never user supplied.
pub const MIGRATION_TABLE: &str = "migration";

/// Hands out exclusively-owned registry connections.
///
/// Every logical operation is bracketed by `acquire` and `release`; `end`
/// shuts the backend down once the process has nothing left to do.
#[async_trait]
pub trait DbManager: Send + Sync {
    type Store: RegistryStore;

    async fn acquire(&self) -> Result<Self::Store, DbError>;

    /// Checks a connection back in. Must not fail: cleanup problems are logged.
    async fn release(&self, store: Self::Store);

    async fn end(&self);
}

/// The registry table plus transaction control, bound to one connection.
///
/// Transactions are explicit: `begin`, `commit` and `rollback` issue the
/// statements of the same name, and savepoints are only valid between them.
#[async_trait]
pub trait RegistryStore: Send {
    /// Whether the registry table name currently resolves.
    async fn table_exists(&mut self) -> Result<bool, DbError>;

    async fn create_table(&mut self) -> Result<(), DbError>;

    /// Ensures the registry table exists. Never destructive.
    async fn init(&mut self) -> Result<(), DbError> {
        if !self.table_exists().await? {
            tracing::info!(table = MIGRATION_TABLE, "Creating migration registry table");
            self.create_table().await?;
        }
        Ok(())
    }

    /// All records, ascending by `exec_order`.
    async fn list(&mut self) -> Result<Vec<MigrationRecord>, DbError>;

    /// Records with `executed = false`, ascending by `exec_order`.
    async fn list_pending(&mut self) -> Result<Vec<MigrationRecord>, DbError>;

    async fn exists(&mut self, filename: &str) -> Result<bool, DbError>;

    async fn find_by_order(&mut self, exec_order: i32) -> Result<Option<MigrationRecord>, DbError>;

    /// Fails with `DbError::UniqueViolation` if the filename or order is taken.
    async fn insert(&mut self, filename: &str, exec_order: i32) -> Result<MigrationRecord, DbError>;

    async fn mark_executed(&mut self, id: i32) -> Result<(), DbError>;

    /// Removes every record, returning how many were deleted.
    async fn delete_all(&mut self) -> Result<u64, DbError>;

    async fn begin(&mut self) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    async fn savepoint(&mut self, name: &SavepointName) -> Result<(), DbError>;

    async fn release_savepoint(&mut self, name: &SavepointName) -> Result<(), DbError>;

    /// Runs `sql` verbatim as one batch of statements.
    async fn run_script(&mut self, sql: &str) -> Result<(), DbError>;
}
