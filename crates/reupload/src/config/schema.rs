use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::partition::{Partition, PartitionError};
use crate::transfer::RetryPolicy;

/// A single reupload run, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub version: String,
    /// Input list of work items. Required unless `resume` is set.
    #[serde(default)]
    pub csv: Option<PathBuf>,
    #[serde(default = "default_state_db")]
    pub state_db: PathBuf,
    /// Skip seeding and work from the state database alone.
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "default_workitem_workers")]
    pub workitem_workers: usize,
    #[serde(default = "default_file_workers")]
    pub file_workers: usize,
    /// Zero-based index of this instance. Both or neither of `partition`
    /// and `total_partitions` must be given.
    #[serde(default)]
    pub partition: Option<u32>,
    #[serde(default)]
    pub total_partitions: Option<u32>,
    /// JSON array of file metadata entries.
    pub manifest: PathBuf,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    #[serde(default = "default_target_container")]
    pub target_container: String,
    /// When set, each new upload is announced as a JSON line in this file.
    #[serde(default)]
    pub queue_file: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Write the input CSV minus completed work items here after the run.
    #[serde(default)]
    pub remaining_csv: Option<PathBuf>,
    /// Check every completed file against the target store after the run.
    #[serde(default)]
    pub validate_after_run: bool,
}

fn default_state_db() -> PathBuf {
    PathBuf::from("reupload_state.db")
}

fn default_workitem_workers() -> usize {
    20
}

fn default_file_workers() -> usize {
    10
}

fn default_target_container() -> String {
    "results".to_string()
}

impl RunConfig {
    pub fn partition(&self) -> Result<Option<Partition>, PartitionError> {
        Partition::from_parts(self.partition, self.total_partitions)
    }

    /// Enough connections for every outer and inner worker to hold one at
    /// once, within SQLite's practical limits.
    pub fn db_pool_size(&self) -> u32 {
        let wanted = self.workitem_workers.saturating_mul(self.file_workers + 1);
        wanted.clamp(4, 64) as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}
