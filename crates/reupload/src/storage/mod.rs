//! Object store and notification seams.
//!
//! Concrete cloud clients live outside this crate; they plug in through
//! [`ObjectStore`] and [`Notifier`]. Failures are reported as explicit
//! [`StoreError`] variants so callers can tell retryable errors from final
//! ones by matching, and "already exists" is a normal [`PutOutcome`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod filesystem;
pub mod queue;

pub use filesystem::LocalObjectStore;
pub use queue::QueueFileNotifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Result of a create-if-absent upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// Another writer got there first; the object is left untouched.
    AlreadyExists,
}

/// Blob storage used as either the source or the target of a transfer.
///
/// Implementations must be safe to call from many threads at once.
pub trait ObjectStore: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool, StoreError>;

    fn get(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Uploads `bytes` under `name` only if nothing is stored there yet.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError>;
}

/// Downstream queue told about each new upload.
pub trait Notifier: Send + Sync {
    fn send(&self, message: &str) -> Result<(), StoreError>;
}

/// Message announcing a newly uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub container_name: String,
    pub blob_name: String,
}

impl QueueMessage {
    pub fn new(container: impl Into<String>, blob_name: impl Into<String>) -> Self {
        Self {
            container_name: container.into(),
            blob_name: blob_name.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Fatal(e.to_string()))
    }
}
