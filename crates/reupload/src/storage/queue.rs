use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Notifier, StoreError};

/// Notifier that appends each message as one line of a local file.
///
/// Appends are serialized through a mutex so concurrent senders never
/// interleave partial lines.
#[derive(Debug)]
pub struct QueueFileNotifier {
    path: PathBuf,
    lock: Mutex<()>,
}

impl QueueFileNotifier {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for QueueFileNotifier {
    fn send(&self, message: &str) -> Result<(), StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Fatal("Queue file lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Fatal(e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Transient(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{message}").map_err(|e| StoreError::Transient(e.to_string()))
    }
}
