//! Metadata resolution: which files belong to a work item.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{FileMetadata, WorkKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Metadata lookup failed: {0}")]
    Lookup(String),

    #[error("Metadata lookup timed out: {0}")]
    Timeout(String),
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Looks up the files of a work item. The returned list is ordered and may
/// contain several entries that map to the same destination.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, key: &WorkKey) -> Result<Vec<FileMetadata>, ResolveError>;
}

/// Resolver backed by a JSON array of [`FileMetadata`] loaded up front.
#[derive(Debug, Default)]
pub struct ManifestResolver {
    files: HashMap<WorkKey, Vec<FileMetadata>>,
}

impl ManifestResolver {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<FileMetadata> =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        log::info!("Loaded {} manifest entries from {}", entries.len(), path.display());
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = FileMetadata>) -> Self {
        let mut files: HashMap<WorkKey, Vec<FileMetadata>> = HashMap::new();
        for entry in entries {
            files.entry(entry.key()).or_default().push(entry);
        }
        for list in files.values_mut() {
            list.sort_by(|a, b| a.filename.cmp(&b.filename));
        }
        Self { files }
    }

    pub fn workitem_count(&self) -> usize {
        self.files.len()
    }
}

impl MetadataResolver for ManifestResolver {
    fn resolve(&self, key: &WorkKey) -> Result<Vec<FileMetadata>, ResolveError> {
        Ok(self.files.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(workitem_id: &str, filename: &str) -> FileMetadata {
        FileMetadata {
            job_id: "j1".into(),
            workitem_id: workitem_id.into(),
            workitem_name: format!("{workitem_id}-name"),
            source_uri: format!("src/{filename}"),
            filename: filename.into(),
        }
    }

    #[test]
    fn test_groups_and_orders_by_filename() {
        let resolver = ManifestResolver::from_entries(vec![
            entry("w1", "b.json"),
            entry("w2", "x.json"),
            entry("w1", "a.json"),
        ]);
        assert_eq!(resolver.workitem_count(), 2);

        let files = resolver.resolve(&WorkKey::new("w1", "j1")).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["a.json", "b.json"]);
    }

    #[test]
    fn test_unknown_workitem_resolves_empty() {
        let resolver = ManifestResolver::from_entries(vec![entry("w1", "a.json")]);
        assert!(resolver.resolve(&WorkKey::new("w1", "other-job")).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, serde_json::to_string(&vec![entry("w1", "a.json")]).unwrap()).unwrap();

        let resolver = ManifestResolver::load(&path).unwrap();
        assert_eq!(resolver.resolve(&WorkKey::new("w1", "j1")).unwrap().len(), 1);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ManifestResolver::load(&path), Err(ManifestError::Parse { .. })));
        assert!(matches!(
            ManifestResolver::load(&dir.path().join("missing.json")),
            Err(ManifestError::Read { .. })
        ));
    }
}
