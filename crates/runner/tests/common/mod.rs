#![allow(dead_code)]

//! An in-memory stand-in for the PostgreSQL registry.
//!
//! It keeps PostgreSQL's transaction semantics that the runner relies on:
//! `ROLLBACK` restores the state from `BEGIN` (released savepoints included),
//! a failed statement aborts the transaction until it is rolled back, and
//! filename and order are unique.

use async_trait::async_trait;
use core_types::{MigrationRecord, SavepointName};
use database::{DbError, DbManager, RegistryStore};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Any migration body containing this marker fails when run.
pub const FAILING_BODY: &str = "-- fail";

#[derive(Debug, Clone, Default)]
struct Tables {
    registry_exists: bool,
    rows: Vec<MigrationRecord>,
    next_id: i32,
    /// Bodies whose effects are currently visible, in the order they ran.
    applied: Vec<String>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    /// Every body ever run, including ones later rolled back.
    attempts: Vec<String>,
    /// Committed by "another runner" just before the next insert lands.
    concurrent_insert: Option<MigrationRecord>,
    acquired: usize,
    released: usize,
    released_mid_transaction: usize,
    ended: bool,
}

fn query_error(message: impl Into<String>) -> DbError {
    DbError::QueryError(sqlx::Error::Protocol(message.into()))
}

fn registry(shared: &mut Shared) -> Result<&mut Tables, DbError> {
    if shared.tables.registry_exists {
        Ok(&mut shared.tables)
    } else {
        Err(query_error(r#"relation "migration" does not exist"#))
    }
}

fn sorted(mut rows: Vec<MigrationRecord>) -> Vec<MigrationRecord> {
    rows.sort_by_key(|r| r.exec_order);
    rows
}

#[derive(Clone, Default)]
pub struct MemoryManager {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    /// Inserts a record directly, creating the registry table if needed.
    pub fn seed(&self, filename: &str, exec_order: i32, executed: bool) -> MigrationRecord {
        let mut shared = self.lock();
        let tables = &mut shared.tables;
        tables.registry_exists = true;
        tables.next_id += 1;
        let record = MigrationRecord {
            id: tables.next_id,
            filename: filename.to_string(),
            exec_order,
            executed,
        };
        tables.rows.push(record.clone());
        record
    }

    /// Makes another runner commit `filename` right before this runner's next
    /// insert, after the registrar has already checked for collisions.
    pub fn race_next_insert(&self, filename: &str, exec_order: i32) -> MigrationRecord {
        let mut shared = self.lock();
        shared.tables.next_id += 1;
        let record = MigrationRecord {
            id: shared.tables.next_id,
            filename: filename.to_string(),
            exec_order,
            executed: false,
        };
        shared.concurrent_insert = Some(record.clone());
        record
    }

    pub fn records(&self) -> Vec<MigrationRecord> {
        sorted(self.lock().tables.rows.clone())
    }

    pub fn registry_exists(&self) -> bool {
        self.lock().tables.registry_exists
    }

    /// Bodies whose effects survived, in application order.
    pub fn applied(&self) -> Vec<String> {
        self.lock().tables.applied.clone()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    pub fn open_connections(&self) -> usize {
        let shared = self.lock();
        shared.acquired - shared.released
    }

    pub fn released_mid_transaction(&self) -> usize {
        self.lock().released_mid_transaction
    }

    pub fn ended(&self) -> bool {
        self.lock().ended
    }
}

#[async_trait]
impl DbManager for MemoryManager {
    type Store = MemoryStore;

    async fn acquire(&self) -> Result<MemoryStore, DbError> {
        self.lock().acquired += 1;
        Ok(MemoryStore {
            shared: Arc::clone(&self.shared),
            snapshot: None,
            savepoints: Vec::new(),
            aborted: false,
        })
    }

    async fn release(&self, store: MemoryStore) {
        let mut shared = self.lock();
        if let Some(snapshot) = store.snapshot {
            shared.tables = snapshot;
            shared.released_mid_transaction += 1;
        }
        shared.released += 1;
    }

    async fn end(&self) {
        self.lock().ended = true;
    }
}

pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    /// State as of `BEGIN`, present while a transaction is open.
    snapshot: Option<Tables>,
    savepoints: Vec<(String, Tables)>,
    aborted: bool,
}

impl MemoryStore {
    /// Runs `op` against the shared state, aborting an open transaction on error.
    fn with<T>(&mut self, op: impl FnOnce(&mut Shared) -> Result<T, DbError>) -> Result<T, DbError> {
        if self.aborted {
            return Err(query_error(
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }
        let result = op(&mut self.shared.lock().unwrap());
        if result.is_err() && self.snapshot.is_some() {
            self.aborted = true;
        }
        result
    }

    fn end_transaction(&mut self) {
        self.snapshot = None;
        self.savepoints.clear();
        self.aborted = false;
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn table_exists(&mut self) -> Result<bool, DbError> {
        self.with(|shared| Ok(shared.tables.registry_exists))
    }

    async fn create_table(&mut self) -> Result<(), DbError> {
        self.with(|shared| {
            shared.tables.registry_exists = true;
            Ok(())
        })
    }

    async fn list(&mut self) -> Result<Vec<MigrationRecord>, DbError> {
        self.with(|shared| Ok(sorted(registry(shared)?.rows.clone())))
    }

    async fn list_pending(&mut self) -> Result<Vec<MigrationRecord>, DbError> {
        self.with(|shared| {
            let pending = registry(shared)?
                .rows
                .iter()
                .filter(|r| !r.executed)
                .cloned()
                .collect();
            Ok(sorted(pending))
        })
    }

    async fn exists(&mut self, filename: &str) -> Result<bool, DbError> {
        self.with(|shared| Ok(registry(shared)?.rows.iter().any(|r| r.filename == filename)))
    }

    async fn find_by_order(&mut self, exec_order: i32) -> Result<Option<MigrationRecord>, DbError> {
        self.with(|shared| {
            Ok(registry(shared)?
                .rows
                .iter()
                .find(|r| r.exec_order == exec_order)
                .cloned())
        })
    }

    async fn insert(&mut self, filename: &str, exec_order: i32) -> Result<MigrationRecord, DbError> {
        let concurrent = self.shared.lock().unwrap().concurrent_insert.take();
        if let Some(record) = concurrent {
            // Committed elsewhere, so it survives this transaction's rollback.
            if let Some(snapshot) = &mut self.snapshot {
                snapshot.rows.push(record.clone());
            }
            self.shared.lock().unwrap().tables.rows.push(record);
        }
        self.with(|shared| {
            let tables = registry(shared)?;
            if tables.rows.iter().any(|r| r.filename == filename) {
                return Err(DbError::UniqueViolation("migration_filename_key".into()));
            }
            if tables.rows.iter().any(|r| r.exec_order == exec_order) {
                return Err(DbError::UniqueViolation("migration_exec_order_key".into()));
            }
            tables.next_id += 1;
            let record = MigrationRecord {
                id: tables.next_id,
                filename: filename.to_string(),
                exec_order,
                executed: false,
            };
            tables.rows.push(record.clone());
            Ok(record)
        })
    }

    async fn mark_executed(&mut self, id: i32) -> Result<(), DbError> {
        self.with(|shared| {
            if let Some(row) = registry(shared)?.rows.iter_mut().find(|r| r.id == id) {
                row.executed = true;
            }
            Ok(())
        })
    }

    async fn delete_all(&mut self) -> Result<u64, DbError> {
        self.with(|shared| {
            let tables = registry(shared)?;
            let removed = tables.rows.len() as u64;
            tables.rows.clear();
            Ok(removed)
        })
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        let snapshot = self.with(|shared| Ok(shared.tables.clone()))?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if self.aborted {
            // PostgreSQL turns COMMIT of an aborted transaction into a rollback.
            self.rollback().await?;
            return Err(query_error("COMMIT of an aborted transaction"));
        }
        self.end_transaction();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.shared.lock().unwrap().tables = snapshot;
        }
        self.end_transaction();
        Ok(())
    }

    async fn savepoint(&mut self, name: &SavepointName) -> Result<(), DbError> {
        if self.snapshot.is_none() {
            return Err(query_error("SAVEPOINT can only be used in transaction blocks"));
        }
        let state = self.with(|shared| Ok(shared.tables.clone()))?;
        self.savepoints.push((name.as_str().to_string(), state));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &SavepointName) -> Result<(), DbError> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(existing, _)| existing == name.as_str());
        match position {
            Some(position) => {
                self.savepoints.truncate(position);
                Ok(())
            }
            None => self.with(|_| Err(query_error(format!("savepoint \"{name}\" does not exist")))),
        }
    }

    async fn run_script(&mut self, sql: &str) -> Result<(), DbError> {
        let body = sql.trim().to_string();
        self.with(|shared| {
            shared.attempts.push(body.clone());
            if body.contains(FAILING_BODY) {
                return Err(query_error(format!("syntax error in migration body: {body}")));
            }
            shared.tables.applied.push(body);
            Ok(())
        })
    }
}

/// Writes a migration file into `dir`.
pub fn write_migration(dir: &Path, filename: &str, body: &str) {
    std::fs::write(dir.join(filename), body).unwrap();
}
