use std::sync::Arc;

use crate::db::StateStore;
use crate::resolver::MetadataResolver;
use crate::transfer::FileTransfer;
use crate::worker::CancellationToken;

/// Everything a run needs, built once and shared by every worker.
#[derive(Clone)]
pub struct RunContext {
    pub store: StateStore,
    pub resolver: Arc<dyn MetadataResolver>,
    pub transfer: Arc<dyn FileTransfer>,
    pub cancel: CancellationToken,
    /// Width of each work item's file pool.
    pub file_workers: usize,
}

impl RunContext {
    pub fn new(
        store: StateStore,
        resolver: Arc<dyn MetadataResolver>,
        transfer: Arc<dyn FileTransfer>,
        cancel: CancellationToken,
        file_workers: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            transfer,
            cancel,
            file_workers: file_workers.max(1),
        }
    }
}
