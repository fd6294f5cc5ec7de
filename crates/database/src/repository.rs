use crate::error::DbError;
use crate::store::{DbManager, MIGRATION_TABLE, RegistryStore};
use async_trait::async_trait;
use core_types::{MigrationRecord, SavepointName};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgRow, Postgres};
use sqlx::Row;

/// Hands out pooled PostgreSQL connections wrapped as registry stores.
#[derive(Debug, Clone)]
pub struct PgManager {
    pool: PgPool,
}

impl PgManager {
    /// Creates a new `PgManager` over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DbManager for PgManager {
    type Store = PgRegistryStore;

    async fn acquire(&self) -> Result<PgRegistryStore, DbError> {
        let conn = self.pool.acquire().await?;
        tracing::debug!("Acquired database connection");
        Ok(PgRegistryStore::new(conn))
    }

    async fn release(&self, mut store: PgRegistryStore) {
        // The pool does not know about transactions opened with raw statements,
        // so never hand back a connection that is still inside one.
        if store.in_transaction {
            tracing::warn!("Releasing a connection with an open transaction; rolling back");
            if let Err(e) = store.rollback().await {
                tracing::error!(error = %e, "Rollback during release failed; closing connection");
                if let Err(e) = store.conn.close().await {
                    tracing::error!(error = %e, "Failed to close connection");
                }
                return;
            }
        }
        drop(store);
        tracing::debug!("Released database connection");
    }

    async fn end(&self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}

/// The `migration` registry on one pooled PostgreSQL connection.
#[derive(Debug)]
pub struct PgRegistryStore {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl PgRegistryStore {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }

    /// Runs unprepared SQL, possibly several statements, on this connection.
    async fn raw(&mut self, sql: &str) -> Result<(), DbError> {
        // A concrete `&mut PgConnection` keeps the future `Send` under `async_trait`.
        let conn: &mut PgConnection = &mut self.conn;
        sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
            .await
            .map_err(DbError::from_query)?;
        Ok(())
    }
}

/// Decodes one registry row, naming the column when it is absent or mistyped.
fn decode_record(row: &PgRow) -> Result<MigrationRecord, DbError> {
    fn get<'r, T>(row: &'r PgRow, column: &'static str) -> Result<T, DbError>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get(column)
            .map_err(|source| DbError::DecodeError { column, source })
    }

    // The column has a default but is nullable; NULL reads as not executed.
    let executed: Option<bool> = get(row, "executed")?;

    Ok(MigrationRecord {
        id: get(row, "id")?,
        filename: get(row, "filename")?,
        exec_order: get(row, "exec_order")?,
        executed: executed.unwrap_or(false),
    })
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn table_exists(&mut self) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(MIGRATION_TABLE)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(exists)
    }

    async fn create_table(&mut self) -> Result<(), DbError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                id SERIAL,
                filename VARCHAR(255) NOT NULL,
                exec_order INTEGER NOT NULL,
                executed BOOLEAN DEFAULT FALSE,

                UNIQUE(filename),
                UNIQUE(exec_order)
            )
            "#
        );
        self.raw(&sql).await
    }

    async fn list(&mut self) -> Result<Vec<MigrationRecord>, DbError> {
        let sql = format!(
            "SELECT id, filename, exec_order, executed FROM {MIGRATION_TABLE} ORDER BY exec_order ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_record).collect()
    }

    async fn list_pending(&mut self) -> Result<Vec<MigrationRecord>, DbError> {
        let sql = format!(
            r#"
            SELECT id, filename, exec_order, executed FROM {MIGRATION_TABLE}
            WHERE executed IS NOT TRUE
            ORDER BY exec_order ASC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_record).collect()
    }

    async fn exists(&mut self, filename: &str) -> Result<bool, DbError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {MIGRATION_TABLE} WHERE filename = $1)");
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(filename)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(exists)
    }

    async fn find_by_order(&mut self, exec_order: i32) -> Result<Option<MigrationRecord>, DbError> {
        let sql = format!(
            "SELECT id, filename, exec_order, executed FROM {MIGRATION_TABLE} WHERE exec_order = $1"
        );
        let row = sqlx::query(&sql)
            .bind(exec_order)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.as_ref().map(decode_record).transpose()
    }

    async fn insert(&mut self, filename: &str, exec_order: i32) -> Result<MigrationRecord, DbError> {
        let sql = format!(
            r#"
            INSERT INTO {MIGRATION_TABLE} (filename, exec_order) VALUES ($1, $2)
            RETURNING id, filename, exec_order, executed
            "#
        );
        let row = sqlx::query(&sql)
            .bind(filename)
            .bind(exec_order)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(DbError::from_query)?;
        decode_record(&row)
    }

    async fn mark_executed(&mut self, id: i32) -> Result<(), DbError> {
        let sql = format!("UPDATE {MIGRATION_TABLE} SET executed = TRUE WHERE id = $1");
        sqlx::query(&sql).bind(id).execute(&mut *self.conn).await?;
        Ok(())
    }

    async fn delete_all(&mut self) -> Result<u64, DbError> {
        let sql = format!("DELETE FROM {MIGRATION_TABLE}");
        let result = sqlx::query(&sql).execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.raw("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.raw("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.raw("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn savepoint(&mut self, name: &SavepointName) -> Result<(), DbError> {
        self.raw(&format!("SAVEPOINT {name}")).await
    }

    async fn release_savepoint(&mut self, name: &SavepointName) -> Result<(), DbError> {
        self.raw(&format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn run_script(&mut self, sql: &str) -> Result<(), DbError> {
        self.raw(sql).await
    }
}
