use crate::error::RunnerError;
use crate::scanner::Manifest;
use core_types::{MigrationFile, MigrationRecord};
use database::RegistryStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One disagreement between the local files and the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// A local file has no registry record yet.
    Unregistered { filename: String },
    /// A file and its record disagree on the execution order.
    OrderMismatch {
        filename: String,
        local_order: i32,
        registered_order: i32,
        id: i32,
    },
    /// A record names a file that is not on disk, so its body cannot be read.
    MissingLocally { filename: String, id: i32 },
    /// Several local files share one execution order.
    DuplicateLocalOrder { exec_order: i32, filenames: Vec<String> },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Unregistered { .. } => Severity::Warning,
            Finding::OrderMismatch { .. }
            | Finding::MissingLocally { .. }
            | Finding::DuplicateLocalOrder { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Unregistered { filename } => {
                write!(f, "Found unregistered migration '{filename}'")
            }
            Finding::OrderMismatch {
                filename,
                local_order,
                registered_order,
                id,
            } => write!(
                f,
                "Local migration order doesn't match registered migrations! \
                 LOCAL: file:{filename}, order:{local_order} \
                 REGISTERED: file:{filename}, order:{registered_order}, id:{id}"
            ),
            Finding::MissingLocally { filename, id } => {
                write!(f, "Registered migration not found locally: {filename} (id {id})")
            }
            Finding::DuplicateLocalOrder {
                exec_order,
                filenames,
            } => write!(
                f,
                "Local migrations share order {exec_order}: {}",
                filenames.join(", ")
            ),
        }
    }
}

/// Everything the validator found in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Valid unless at least one finding is an error. Warnings alone pass.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    /// Valid and every local file is registered, i.e. safe to execute.
    pub fn is_executable(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity() == severity)
            .count()
    }

    /// Emits one log line per finding at its severity.
    pub fn log(&self) {
        for finding in &self.findings {
            match finding.severity() {
                Severity::Warning => tracing::warn!("{finding}"),
                Severity::Error => tracing::error!("{finding}"),
            }
        }
        if self.is_valid() {
            if self.findings.is_empty() {
                tracing::info!("No issues found.");
            } else {
                tracing::info!(warnings = self.warning_count(), "No errors found.");
            }
        } else {
            tracing::error!(
                errors = self.error_count(),
                warnings = self.warning_count(),
                "Invalid state found"
            );
        }
    }
}

/// Cross-references local files with registry records.
///
/// Every check runs to completion so one report shows the whole drift picture.
pub fn validate(files: &[MigrationFile], records: &[MigrationRecord]) -> ValidationReport {
    let mut findings = Vec::new();
    let by_filename: HashMap<&str, &MigrationRecord> =
        records.iter().map(|r| (r.filename.as_str(), r)).collect();

    for file in files {
        match by_filename.get(file.filename.as_str()) {
            None => findings.push(Finding::Unregistered {
                filename: file.filename.clone(),
            }),
            Some(record) if record.exec_order != file.exec_order => {
                findings.push(Finding::OrderMismatch {
                    filename: file.filename.clone(),
                    local_order: file.exec_order,
                    registered_order: record.exec_order,
                    id: record.id,
                })
            }
            Some(_) => {}
        }
    }

    let local: HashSet<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    for record in records {
        if !local.contains(record.filename.as_str()) {
            findings.push(Finding::MissingLocally {
                filename: record.filename.clone(),
                id: record.id,
            });
        }
    }

    let mut by_order: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
    for file in files {
        by_order
            .entry(file.exec_order)
            .or_default()
            .push(file.filename.as_str());
    }
    for (exec_order, mut names) in by_order {
        if names.len() > 1 {
            names.sort_unstable();
            findings.push(Finding::DuplicateLocalOrder {
                exec_order,
                filenames: names.into_iter().map(str::to_string).collect(),
            });
        }
    }

    ValidationReport { findings }
}

/// Loads the registry and validates the manifest against it, logging the result.
pub async fn check<S: RegistryStore>(
    store: &mut S,
    manifest: &Manifest,
) -> Result<ValidationReport, RunnerError> {
    tracing::info!("Validating migrations");
    let records = store.list().await?;
    let report = validate(manifest.files(), &records);
    report.log();
    Ok(report)
}
