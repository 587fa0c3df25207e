//! Per work item state machine.
//!
//! resolve -> dedupe -> claim -> dispatch -> reconcile. The work item's
//! terminal write always happens after every dispatched file has written
//! its own terminal status.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug_span, info_span};

use super::job::{FileResult, WorkItemOutcome};
use super::pool::{run_guarded, WorkerPool};
use crate::context::RunContext;
use crate::db::{file_repo, workitem_repo};
use crate::error::ProcessError;
use crate::model::{FileMetadata, Status, WorkKey};
use crate::transfer::{destination_identity, TransferOutcome};

/// How many failed filenames a work item's error message lists.
const FAILED_NAMES_SHOWN: usize = 5;

pub const SHUTDOWN_NOTE: &str = "Shutdown requested mid-processing";

pub struct WorkItemProcessor {
    ctx: Arc<RunContext>,
}

impl WorkItemProcessor {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Processes one work item. Never returns an error: storage failures are
    /// recorded as a work item failure, retryable on the next run.
    pub fn process(&self, key: &WorkKey) -> WorkItemOutcome {
        let span = info_span!("workitem", id = %key.workitem_id, job = %key.job_id);
        let _enter = span.enter();

        match self.try_process(key) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("Unexpected error: {e}");
                log::error!("Failed to process work item {}: {}", key, message);
                if let Err(e) = workitem_repo::set_status(&self.ctx.store, key, Status::Failed, Some(&message)) {
                    log::error!("Could not record failure for {}: {}", key, e);
                }
                WorkItemOutcome::Failed(message)
            }
        }
    }

    fn try_process(&self, key: &WorkKey) -> Result<WorkItemOutcome, ProcessError> {
        let db = &self.ctx.store;

        if workitem_repo::get_status(db, key)? == Some(Status::Completed) {
            log::info!("Work item {} already completed, skipping", key);
            return Ok(WorkItemOutcome::Completed);
        }

        log::info!("Processing work item {}", key);
        workitem_repo::set_status(db, key, Status::InProgress, None)?;

        let resolved = match self.ctx.resolver.resolve(key) {
            Ok(files) => files,
            Err(e) => {
                let message = e.to_string();
                log::warn!("Work item {}: {}", key, message);
                workitem_repo::set_status(db, key, Status::Failed, Some(&message))?;
                return Ok(WorkItemOutcome::Failed(message));
            }
        };

        if resolved.is_empty() {
            log::warn!("No files found for work item {}", key);
            workitem_repo::set_files_total(db, key, 0)?;
            workitem_repo::set_status(db, key, Status::Completed, None)?;
            return Ok(WorkItemOutcome::Completed);
        }

        let files = dedupe(key, resolved);
        workitem_repo::set_files_total(db, key, files.len() as u64)?;

        if self.ctx.cancel.is_cancelled() {
            log::info!("Aborting work item {}, shutdown requested", key);
            workitem_repo::set_status(db, key, Status::Pending, Some(SHUTDOWN_NOTE))?;
            return Ok(WorkItemOutcome::Interrupted);
        }

        let claimed = self.claim_files(key, files)?;
        if claimed.is_empty() {
            log::info!("All files already completed or claimed for work item {}", key);
            workitem_repo::set_status(db, key, Status::Completed, None)?;
            return Ok(WorkItemOutcome::Completed);
        }

        self.dispatch(key, claimed)
    }

    /// Upserts every file row and claims the ones not yet completed.
    fn claim_files(&self, key: &WorkKey, files: Vec<FileMetadata>) -> Result<Vec<FileMetadata>, ProcessError> {
        let db = &self.ctx.store;
        let mut claimed = Vec::with_capacity(files.len());
        let mut skipped_completed = 0;
        let mut skipped_claimed = 0;

        let result = (|| -> Result<(), ProcessError> {
            for file in files {
                file_repo::upsert(db, key, &file.filename, &file.source_uri)?;
                if file_repo::get_status(db, key, &file.filename)? == Some(Status::Completed) {
                    skipped_completed += 1;
                    continue;
                }
                if file_repo::claim(db, key, &file.filename)? {
                    claimed.push(file);
                } else {
                    skipped_claimed += 1;
                }
            }
            Ok(())
        })();

        if let Err(e) = result {
            self.release_claims(key, &claimed);
            return Err(e);
        }

        if skipped_completed > 0 {
            log::info!("Skipping {} already-completed files for work item {}", skipped_completed, key);
        }
        if skipped_claimed > 0 {
            log::info!("Skipping {} files already claimed for work item {}", skipped_claimed, key);
        }
        Ok(claimed)
    }

    /// Runs the claimed files through a bounded file pool. At most
    /// `file_workers` files are in flight, so on cancellation everything
    /// not yet submitted is still ours to release.
    ///
    /// Cancellation seen before the pool is fully drained reverts the work
    /// item to `pending`, even when every claimed file was already submitted.
    fn dispatch(&self, key: &WorkKey, claimed: Vec<FileMetadata>) -> Result<WorkItemOutcome, ProcessError> {
        let db = &self.ctx.store;
        let width = self.ctx.file_workers.min(claimed.len());

        let ctx = Arc::clone(&self.ctx);
        let owner = key.clone();
        let pool = WorkerPool::new(
            format!("files-{}", key.workitem_id),
            width,
            move |file: FileMetadata| transfer_file(&ctx, &owner, file),
        )?;

        let mut queue: VecDeque<FileMetadata> = claimed.into();
        let mut in_flight = 0;
        let mut failed: Vec<String> = Vec::new();
        let mut cancelled = false;

        loop {
            while in_flight < width && !cancelled && !queue.is_empty() {
                if self.ctx.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let Some(file) = queue.pop_front() else {
                    break;
                };
                if let Err(e) = pool.submit(file.clone()) {
                    queue.push_front(file);
                    self.release_claims(key, queue.make_contiguous());
                    return Err(e.into());
                }
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            match pool.recv_result() {
                Some(Ok(result)) => {
                    if let Some(error) = result.failure() {
                        log::warn!("File {} failed: {}", result.filename, error);
                        failed.push(result.filename);
                    }
                }
                Some(Err(e)) => failed.push(format!("<{e}>")),
                None => {
                    self.release_claims(key, queue.make_contiguous());
                    return Err(crate::error::WorkerError::ChannelClosed.into());
                }
            }
            in_flight -= 1;

            let drained = in_flight == 0 && queue.is_empty();
            if !drained && self.ctx.cancel.is_cancelled() {
                cancelled = true;
            }
        }
        pool.wait();

        if cancelled {
            log::info!(
                "Canceling {} remaining files for work item {} ({} failed before shutdown)",
                queue.len(),
                key,
                failed.len()
            );
            self.release_claims(key, queue.make_contiguous());
            workitem_repo::set_status(db, key, Status::Pending, Some(SHUTDOWN_NOTE))?;
            return Ok(WorkItemOutcome::Interrupted);
        }

        if failed.is_empty() {
            workitem_repo::set_status(db, key, Status::Completed, None)?;
            log::info!("Successfully processed work item {}", key);
            Ok(WorkItemOutcome::Completed)
        } else {
            let message = failure_summary(&failed);
            workitem_repo::set_status(db, key, Status::Failed, Some(&message))?;
            Ok(WorkItemOutcome::Failed(message))
        }
    }

    /// Best-effort return of undispatched claims to `pending`.
    fn release_claims(&self, key: &WorkKey, files: &[FileMetadata]) {
        for file in files {
            if let Err(e) = file_repo::release_claim(&self.ctx.store, key, &file.filename) {
                log::warn!(
                    "Could not release claim on {} for {}, it will be re-armed next run: {}",
                    file.filename,
                    key,
                    e
                );
            }
        }
    }
}

/// Keeps the first file for each destination identity.
fn dedupe(key: &WorkKey, files: Vec<FileMetadata>) -> Vec<FileMetadata> {
    let raw = files.len();
    let mut seen = HashSet::with_capacity(raw);
    let unique: Vec<FileMetadata> = files
        .into_iter()
        .filter(|file| {
            let fresh = seen.insert(destination_identity(&file.workitem_name, &file.filename));
            if !fresh {
                log::debug!(
                    "Duplicate file entry for work item {}: {} (source {})",
                    key,
                    file.filename,
                    file.source_uri
                );
            }
            fresh
        })
        .collect();

    if unique.len() < raw {
        log::info!(
            "Detected {} duplicate file entries for work item {}; processing {} unique files",
            raw - unique.len(),
            key,
            unique.len()
        );
    }
    unique
}

/// Transfers one claimed file and writes its terminal status.
fn transfer_file(ctx: &RunContext, key: &WorkKey, file: FileMetadata) -> FileResult {
    let _span = debug_span!("file", name = %file.filename).entered();

    let outcome = run_guarded(|| ctx.transfer.transfer(&file))
        .unwrap_or_else(|panic| TransferOutcome::Failed(format!("Transfer panicked: {panic}")));

    let recorded = match outcome.error() {
        Some(error) => file_repo::set_status(&ctx.store, key, &file.filename, Status::Failed, Some(error)),
        None => file_repo::set_status(&ctx.store, key, &file.filename, Status::Completed, None),
    };
    let record_error = recorded.err().map(|e| {
        log::error!("Could not record status of {} for {}: {}", file.filename, key, e);
        e.to_string()
    });

    FileResult {
        filename: file.filename,
        outcome,
        record_error,
    }
}

fn failure_summary(failed: &[String]) -> String {
    let shown = failed
        .iter()
        .take(FAILED_NAMES_SHOWN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut message = format!("{} files failed: {}", failed.len(), shown);
    if failed.len() > FAILED_NAMES_SHOWN {
        message.push_str(&format!(" and {} more", failed.len() - FAILED_NAMES_SHOWN));
    }
    message
}
