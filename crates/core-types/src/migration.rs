use crate::error::CoreError;
use std::fmt;
use std::path::PathBuf;

/// Number of leading filename characters that encode the execution order.
pub const ORDINAL_WIDTH: usize = 3;

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A migration file discovered on disk. Rebuilt on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub filename: String,
    pub absolute_path: PathBuf,
    pub exec_order: i32,
}

impl MigrationFile {
    /// Builds a `MigrationFile`, parsing the execution order from the filename prefix.
    pub fn new(filename: impl Into<String>, absolute_path: PathBuf) -> Result<Self, CoreError> {
        let filename = filename.into();
        let exec_order = parse_exec_order(&filename)?;
        Ok(Self {
            filename,
            absolute_path,
            exec_order,
        })
    }
}

/// One row of the `migration` registry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: i32,
    pub filename: String,
    pub exec_order: i32,
    pub executed: bool,
}

/// Parses the fixed-width numeric prefix of a migration filename.
///
/// `"007_add_index.sql"` yields `7`. Anything that does not start with exactly
/// [`ORDINAL_WIDTH`] ASCII digits is rejected rather than mapped to a default.
pub fn parse_exec_order(filename: &str) -> Result<i32, CoreError> {
    let invalid = || CoreError::InvalidOrdinal {
        filename: filename.to_string(),
        width: ORDINAL_WIDTH,
    };

    let prefix = filename.get(..ORDINAL_WIDTH).ok_or_else(invalid)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    prefix.parse::<i32>().map_err(|_| invalid())
}

/// A savepoint identifier derived from a migration filename.
///
/// Only `[A-Za-z0-9_]` survives; the `sp_` prefix keeps names that start with
/// the numeric ordinal valid as unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavepointName(String);

impl SavepointName {
    pub fn from_filename(filename: &str) -> Self {
        let mut name = String::with_capacity(filename.len() + 3);
        name.push_str("sp_");
        name.extend(
            filename
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_'),
        );
        // Every remaining char is ASCII, so byte truncation is safe.
        name.truncate(MAX_IDENTIFIER_LEN);
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SavepointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_digit_prefix() {
        assert_eq!(parse_exec_order("001_init.sql").unwrap(), 1);
        assert_eq!(parse_exec_order("010_users.sql").unwrap(), 10);
        assert_eq!(parse_exec_order("999").unwrap(), 999);
    }

    #[test]
    fn rejects_non_numeric_prefix() {
        for name in ["init.sql", "01_short.sql", "0a1_mixed.sql", "", "-01_neg.sql", "+01_pos.sql"] {
            let err = parse_exec_order(name).unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidOrdinal { ref filename, .. } if filename == name),
                "expected InvalidOrdinal for {name:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_multibyte_prefix_without_panicking() {
        assert!(parse_exec_order("0é1_x.sql").is_err());
    }

    #[test]
    fn savepoint_strips_punctuation() {
        let name = SavepointName::from_filename("007_add-index.on(users).sql");
        assert_eq!(name.as_str(), "sp_007_addindexonuserssql");
    }

    #[test]
    fn savepoint_is_bounded() {
        let long = format!("001_{}.sql", "x".repeat(200));
        let name = SavepointName::from_filename(&long);
        assert_eq!(name.as_str().len(), 63);
        assert!(name.as_str().starts_with("sp_001_"));
    }

    #[test]
    fn migration_file_carries_order() {
        let file = MigrationFile::new("042_answer.sql", PathBuf::from("/tmp/042_answer.sql")).unwrap();
        assert_eq!(file.exec_order, 42);
        assert_eq!(file.filename, "042_answer.sql");
    }
}
