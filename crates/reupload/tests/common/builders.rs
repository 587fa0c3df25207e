//! Builders and instrumented collaborators for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use reupload::config::{RetryConfig, RunConfig};
use reupload::storage::{LocalObjectStore, ObjectStore, PutOutcome, StoreError};
use reupload::transfer::{FileTransfer, TransferOutcome};
use reupload::{CancellationToken, FileMetadata};

/// Builder for `RunConfig` with test-friendly defaults.
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            config: RunConfig {
                version: "1.0".to_string(),
                csv: Some(root.join("input.csv")),
                state_db: root.join("state.db"),
                resume: false,
                workitem_workers: 4,
                file_workers: 2,
                partition: None,
                total_partitions: None,
                manifest: root.join("manifest.json"),
                source_root: root.join("source"),
                target_root: root.join("target"),
                target_container: "results".to_string(),
                queue_file: None,
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_backoff_ms: 1,
                    max_backoff_ms: 5,
                },
                remaining_csv: None,
                validate_after_run: false,
            },
        }
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.config.resume = resume;
        self
    }

    pub fn workers(mut self, workitem_workers: usize, file_workers: usize) -> Self {
        self.config.workitem_workers = workitem_workers;
        self.config.file_workers = file_workers;
        self
    }

    pub fn partition(mut self, index: u32, total: u32) -> Self {
        self.config.partition = Some(index);
        self.config.total_partitions = Some(total);
        self
    }

    pub fn queue_file(mut self, path: PathBuf) -> Self {
        self.config.queue_file = Some(path);
        self
    }

    pub fn remaining_csv(mut self, path: PathBuf) -> Self {
        self.config.remaining_csv = Some(path);
        self
    }

    pub fn validate_after_run(mut self) -> Self {
        self.config.validate_after_run = true;
        self
    }

    pub fn build(self) -> RunConfig {
        self.config
    }
}

/// Wraps a transfer and records every file it is asked to move. Can cancel
/// a token once a given number of transfers have finished.
pub struct RecordingTransfer<T> {
    inner: T,
    seen: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl<T: FileTransfer> RecordingTransfer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    pub fn cancelling_after(mut self, transfers: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((transfers, token));
        self
    }

    /// Filenames transferred so far, sorted.
    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

impl<T: FileTransfer> FileTransfer for RecordingTransfer<T> {
    fn transfer(&self, file: &FileMetadata) -> TransferOutcome {
        let outcome = self.inner.transfer(file);
        let count = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(file.filename.clone());
            seen.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if count >= *after {
                token.cancel();
            }
        }
        outcome
    }
}

/// Object store that counts reads, delegating to a directory store.
pub struct CountingStore {
    inner: LocalObjectStore,
    gets: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: LocalObjectStore) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl ObjectStore for CountingStore {
    fn exists(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.exists(name)
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(name)
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
        self.inner.put(name, bytes)
    }
}
