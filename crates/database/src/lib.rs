//! # Migrator Database Crate
//!
//! The only place in the workspace that talks SQL. It owns the `migration`
//! registry table and hands out connections to the runner.
//!
//! ## Architectural Principles
//!
//! - **Seams as traits:** the runner only sees [`DbManager`] (acquire, release,
//!   end) and [`RegistryStore`] (registry CRUD, transaction control and raw
//!   script execution on one connection). The PostgreSQL implementations live
//!   in `repository`; tests provide their own.
//! - **Identifiers spliced, values bound:** the registry table name is a
//!   compile-time constant written into the SQL text. Filenames, ordinals and
//!   ids are always bound parameters.
//! - **Typed rows:** registry rows decode into `MigrationRecord` or fail with
//!   `DbError::DecodeError` naming the offending column.
//!
//! ## Public API
//!
//! - `connect`: builds the `PgPool` from `DatabaseSettings`.
//! - `PgManager` / `PgRegistryStore`: the PostgreSQL backend.
//! - `DbError`: the error type for everything in this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, connect_options};
pub use error::DbError;
pub use repository::{PgManager, PgRegistryStore};
pub use store::{DbManager, MIGRATION_TABLE, RegistryStore};
