pub mod error;
pub mod migration;

// Re-export the core types to provide a clean public API.
pub use error::CoreError;
pub use migration::{
    MigrationFile, MigrationRecord, SavepointName, ORDINAL_WIDTH, parse_exec_order,
};
