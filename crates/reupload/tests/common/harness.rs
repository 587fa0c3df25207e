//! Isolated environment for end-to-end runs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use reupload::config::RunConfig;
use reupload::runner::{self, RunOutcome};
use reupload::storage::{LocalObjectStore, ObjectStore};
use reupload::transfer::{FileTransfer, Reuploader, RetryPolicy};
use reupload::{CancellationToken, FileMetadata, ManifestResolver, RunContext, StateStore, WorkKey};

use super::builders::{CountingStore, RunConfigBuilder};

pub struct TestHarness {
    temp_dir: TempDir,
    pub store: StateStore,
    pub source: Arc<CountingStore>,
    pub target: Arc<LocalObjectStore>,
    manifest: Vec<FileMetadata>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let store = StateStore::open(&root.join("state.db")).expect("Failed to open state store");
        let source = Arc::new(CountingStore::new(LocalObjectStore::new(root.join("source"))));
        let target = Arc::new(LocalObjectStore::new(root.join("target")));
        Self {
            temp_dir,
            store,
            source,
            target,
            manifest: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    pub fn config(&self) -> RunConfigBuilder {
        RunConfigBuilder::new(self.root())
    }

    /// Writes `input.csv` with `(id, name, job)` rows.
    pub fn write_csv(&self, rows: &[(&str, &str, &str)]) {
        let mut content = String::from("WorkItemId,WorkItemName,JobId\n");
        for (id, name, job) in rows {
            content.push_str(&format!("{id},{name},{job}\n"));
        }
        std::fs::write(self.path("input.csv"), content).expect("Failed to write CSV");
    }

    /// Puts a file into the source store and registers it for resolution.
    pub fn add_file(&mut self, key: &WorkKey, workitem_name: &str, filename: &str) -> FileMetadata {
        let source_uri = format!("{}/{}/{}", key.job_id, key.workitem_id, filename);
        self.source
            .put(&source_uri, format!("{{\"file\":\"{filename}\"}}").as_bytes())
            .expect("Failed to seed source file");
        let meta = FileMetadata {
            job_id: key.job_id.clone(),
            workitem_id: key.workitem_id.clone(),
            workitem_name: workitem_name.to_string(),
            source_uri,
            filename: filename.to_string(),
        };
        self.manifest.push(meta.clone());
        meta
    }

    /// Registers a manifest entry without source bytes.
    pub fn add_manifest_entry(&mut self, meta: FileMetadata) {
        self.manifest.push(meta);
    }

    /// Writes the manifest to `manifest.json`.
    pub fn write_manifest(&self) -> PathBuf {
        let path = self.path("manifest.json");
        std::fs::write(&path, serde_json::to_string_pretty(&self.manifest).unwrap())
            .expect("Failed to write manifest");
        path
    }

    pub fn reuploader(&self) -> Reuploader {
        Reuploader::new(self.source.clone(), self.target.clone(), "results")
            .with_retry(RetryPolicy::new(2, std::time::Duration::from_millis(1)))
    }

    pub fn context(
        &self,
        config: &RunConfig,
        transfer: Arc<dyn FileTransfer>,
        cancel: CancellationToken,
    ) -> Arc<RunContext> {
        Arc::new(RunContext::new(
            self.store.clone(),
            Arc::new(ManifestResolver::from_entries(self.manifest.clone())),
            transfer,
            cancel,
            config.file_workers,
        ))
    }

    /// Runs with the given transfer against this harness's store.
    pub fn run_with(
        &self,
        config: &RunConfig,
        transfer: Arc<dyn FileTransfer>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let ctx = self.context(config, transfer, cancel);
        runner::execute(config, ctx).expect("run failed")
    }
}
