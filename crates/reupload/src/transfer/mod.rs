//! File transfer from a source store to a target store.

pub mod naming;
pub mod retry;
pub mod reuploader;

use crate::model::FileMetadata;

pub use naming::{destination_identity, destination_name};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use reuploader::Reuploader;

/// How a single file transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Bytes were copied and a new object was created.
    Uploaded,
    /// The destination already existed, either before the transfer started
    /// or because a concurrent writer won the create.
    AlreadyPresent,
    Failed(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TransferOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TransferOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Copies one file to its destination. Implementations are idempotent:
/// transferring a file whose destination exists reports success.
pub trait FileTransfer: Send + Sync {
    fn transfer(&self, file: &FileMetadata) -> TransferOutcome;
}
