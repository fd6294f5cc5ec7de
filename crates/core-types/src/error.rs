use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Migration '{filename}' must start with a {width}-digit execution order (e.g. '001_create_users.sql')")]
    InvalidOrdinal { filename: String, width: usize },

    #[error("Migration filename is not valid UTF-8: {0}")]
    InvalidFilename(String),
}
