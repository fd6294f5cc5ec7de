use crate::error::DbError;
use configuration::DatabaseSettings;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Translates `DatabaseSettings` into driver connection options.
///
/// A configured `url` is the base; otherwise libpq-style defaults are used.
/// Individual fields such as `host` are then applied on top, which is how the
/// `--host` override reaches an otherwise URL-configured connection.
pub fn connect_options(settings: &DatabaseSettings) -> Result<PgConnectOptions, DbError> {
    let mut options = match &settings.url {
        Some(url) => PgConnectOptions::from_str(url)
            .map_err(|e| DbError::ConnectionConfigError(e.to_string()))?,
        None => PgConnectOptions::new(),
    };

    if let Some(host) = &settings.host {
        options = options.host(host);
    }
    if let Some(port) = settings.port {
        options = options.port(port);
    }
    if let Some(username) = &settings.username {
        options = options.username(username);
    }
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    if let Some(database) = &settings.database {
        options = options.database(database);
    }

    Ok(options)
}

/// Establishes a connection pool to the PostgreSQL database.
///
/// The runner works one connection at a time, so the pool stays small; the
/// acquire timeout keeps an unreachable database from hanging the process.
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, DbError> {
    let options = connect_options(settings)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    Ok(pool)
}
