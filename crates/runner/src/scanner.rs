use crate::error::RunnerError;
use core_types::{CoreError, MigrationFile};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The migration files found in one directory, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    dir: PathBuf,
    files: Vec<MigrationFile>,
}

impl Manifest {
    pub fn new(dir: PathBuf, files: Vec<MigrationFile>) -> Self {
        Self { dir, files }
    }

    /// The canonical migrations directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn get(&self, filename: &str) -> Option<&MigrationFile> {
        self.files.iter().find(|f| f.filename == filename)
    }

    /// Where the body of a registered migration lives on disk.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.get(filename)
            .map(|f| f.absolute_path.clone())
            .unwrap_or_else(|| self.dir.join(filename))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Reads `dir` and builds a `MigrationFile` for every file in it.
///
/// Sub-directories are skipped. Any file without a numeric prefix fails the
/// whole scan, as does a directory that is missing or unreadable.
pub fn scan(dir: impl AsRef<Path>) -> Result<Manifest, RunnerError> {
    let dir = dir.as_ref();
    let dir_error = |source: io::Error| RunnerError::DirectoryError {
        path: dir.to_path_buf(),
        source,
    };

    let root = fs::canonicalize(dir).map_err(dir_error)?;
    let mut files = Vec::new();

    for entry in fs::read_dir(&root).map_err(dir_error)? {
        let entry = entry.map_err(dir_error)?;
        let absolute_path = fs::canonicalize(entry.path()).map_err(dir_error)?;
        if fs::metadata(&absolute_path).map_err(dir_error)?.is_dir() {
            tracing::debug!(path = %absolute_path.display(), "Skipping sub-directory");
            continue;
        }

        let filename = entry
            .file_name()
            .into_string()
            .map_err(|name| CoreError::InvalidFilename(name.to_string_lossy().into_owned()))?;

        let file = MigrationFile::new(filename, absolute_path)?;
        tracing::debug!(file = %file.filename, order = file.exec_order, "Found migration");
        files.push(file);
    }

    tracing::debug!(dir = %root.display(), count = files.len(), "Scanned migrations directory");
    Ok(Manifest::new(root, files))
}
