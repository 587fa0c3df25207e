//! Destination naming for transferred files.

use crate::model::basename;

/// Longest object name the target store accepts.
pub const MAX_NAME_LEN: usize = 1024;

const FALLBACK_SUFFIX: &str = "perf-lab-report.json";

/// Identity used to collapse duplicate files within one work item:
/// `{workitem_name}-{basename(filename)}`.
///
/// Unlike [`destination_name`] this never falls back to a random name, so
/// two files with the same base name always compare equal.
pub fn destination_identity(workitem_name: &str, filename: &str) -> String {
    format!("{workitem_name}-{}", basename(filename))
}

/// Object name a file is uploaded under. Names over [`MAX_NAME_LEN`] are
/// replaced by `{workitem_name}-{NNNN}-perf-lab-report.json` with a random
/// four digit number.
pub fn destination_name(workitem_name: &str, filename: &str) -> String {
    let name = destination_identity(workitem_name, filename);
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let fallback = format!("{workitem_name}-{}-{FALLBACK_SUFFIX}", random_four_digits());
    log::warn!(
        "Destination name for '{}' is {} characters, using '{}'",
        basename(filename),
        name.len(),
        fallback
    );
    fallback
}

/// Whether [`destination_name`] is reproducible for this file.
pub fn is_deterministic(workitem_name: &str, filename: &str) -> bool {
    destination_identity(workitem_name, filename).len() <= MAX_NAME_LEN
}

fn random_four_digits() -> u32 {
    1000 + (uuid::Uuid::new_v4().as_u128() % 9000) as u32
}
