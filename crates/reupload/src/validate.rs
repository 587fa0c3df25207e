//! Post-run check that completed files really exist in the target store.

use std::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::db::{file_repo, DatabaseError, StateStore};
use crate::model::WorkKey;
use crate::storage::ObjectStore;
use crate::transfer::naming::{destination_name, is_deterministic};

/// How many missing entries a report keeps.
pub const MISSING_SHOWN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingUpload {
    pub blob_name: String,
    pub key: WorkKey,
    pub filename: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub checked: usize,
    pub found: usize,
    pub missing: usize,
    /// Files uploaded under a random fallback name, which cannot be checked.
    pub unverifiable: usize,
    /// Target lookups that errored; counted as missing.
    pub errors: usize,
    /// The first [`MISSING_SHOWN`] missing uploads.
    pub missing_uploads: Vec<MissingUpload>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing == 0
    }

    fn record_missing(&mut self, entry: MissingUpload) {
        self.missing += 1;
        if self.missing_uploads.len() < MISSING_SHOWN {
            self.missing_uploads.push(entry);
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "UPLOAD VALIDATION")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Checked:               {}", self.checked)?;
        writeln!(f, "  Found:               {}", self.found)?;
        writeln!(f, "  Missing:             {}", self.missing)?;
        if self.unverifiable > 0 {
            writeln!(f, "  Unverifiable:        {}", self.unverifiable)?;
        }
        if !self.missing_uploads.is_empty() {
            writeln!(f)?;
            writeln!(f, "Missing uploads:")?;
            for m in &self.missing_uploads {
                writeln!(f, "  {} ({}, {})", m.blob_name, m.key, m.filename)?;
            }
            if self.missing > self.missing_uploads.len() {
                writeln!(f, "  ... and {} more", self.missing - self.missing_uploads.len())?;
            }
        }
        write!(f, "{rule}")
    }
}

/// Recomputes the destination of every completed file and checks it exists
/// in `target`.
pub fn validate_uploads(store: &StateStore, target: &dyn ObjectStore) -> Result<ValidationReport, DatabaseError> {
    let completed = file_repo::completed_files(store)?;
    info!("Validating {} completed files", completed.len());

    let mut report = ValidationReport::default();
    for file in completed {
        if !is_deterministic(&file.workitem_name, &file.filename) {
            report.unverifiable += 1;
            continue;
        }

        let blob_name = destination_name(&file.workitem_name, &file.filename);
        report.checked += 1;
        let entry = || MissingUpload {
            blob_name: blob_name.clone(),
            key: file.key.clone(),
            filename: file.filename.clone(),
        };
        match target.exists(&blob_name) {
            Ok(true) => report.found += 1,
            Ok(false) => report.record_missing(entry()),
            Err(e) => {
                warn!("Could not check {}: {}", blob_name, e);
                report.errors += 1;
                report.record_missing(entry());
            }
        }
    }

    info!(
        "Validation finished: {} found, {} missing of {} checked",
        report.found, report.missing, report.checked
    );
    Ok(report)
}
