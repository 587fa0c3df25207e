use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use super::{ObjectStore, PutOutcome, StoreError};

/// Maps an IO failure onto the store's error ladder.
fn classify(name: &str, e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            StoreError::Transient(format!("{name}: {e}"))
        }
        _ => StoreError::Fatal(format!("{name}: {e}")),
    }
}

/// A directory used as an object store. Object names are relative paths
/// below the root; absolute names and `..` are rejected.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name.strip_prefix("file://").unwrap_or(name));
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(StoreError::Fatal(format!("Invalid object name '{name}'")));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| classify(&path.display().to_string(), e))?;
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.object_path(name)?;
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(classify(name, e)),
        }
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(name)?;
        std::fs::read(&path).map_err(|e| classify(name, e))
    }

    /// Writes to a private temp file, then hard-links it into place. The
    /// link either creates the object with its full content or fails with
    /// `AlreadyExists`, so readers never observe a partial object.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
        let path = self.object_path(name)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_directory(&dir)?;

        let tmp_path = dir.join(format!(".upload-{}", uuid::Uuid::new_v4()));
        let write_tmp = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(classify(name, e));
        }

        let linked = std::fs::hard_link(&tmp_path, &path);
        let _ = std::fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => Ok(PutOutcome::Created),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyExists),
            Err(e) => Err(classify(name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        assert!(!store.exists("a/report.json").unwrap());
        assert_eq!(store.put("a/report.json", b"{}").unwrap(), PutOutcome::Created);
        assert!(store.exists("a/report.json").unwrap());
        assert_eq!(store.get("a/report.json").unwrap(), b"{}");
    }

    #[test]
    fn test_put_is_create_if_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        store.put("x.json", b"first").unwrap();
        assert_eq!(store.put("x.json", b"second").unwrap(), PutOutcome::AlreadyExists);
        assert_eq!(store.get("x.json").unwrap(), b"first");

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".upload-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        assert_eq!(
            store.get("missing.json"),
            Err(StoreError::NotFound("missing.json".to_string()))
        );
    }

    #[test]
    fn test_rejects_escaping_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        assert!(matches!(store.get("../etc/passwd"), Err(StoreError::Fatal(_))));
        assert!(matches!(store.put("/abs.json", b""), Err(StoreError::Fatal(_))));
        assert!(matches!(store.exists(""), Err(StoreError::Fatal(_))));
    }

    #[test]
    fn test_file_uri_prefix_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        store.put("src/a.json", b"data").unwrap();
        assert_eq!(store.get("file://src/a.json").unwrap(), b"data");
    }
}
