use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database connection settings: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Failed to decode column '{column}' of a registry row: {source}")]
    DecodeError {
        column: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl DbError {
    /// Converts a driver error, singling out unique constraint violations.
    pub(crate) fn from_query(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db_err.message().to_string());
                return DbError::UniqueViolation(constraint);
            }
        }
        DbError::QueryError(err)
    }
}
