use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use super::job::WorkItemOutcome;
use super::pool::WorkerPool;
use super::processor::WorkItemProcessor;
use crate::context::RunContext;
use crate::error::WorkerError;
use crate::model::WorkKey;

const PROGRESS_EVERY: usize = 10;

/// Per-run tally of work item outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: usize,
    pub not_started: usize,
}

impl RunReport {
    pub fn record(&mut self, outcome: &WorkItemOutcome) {
        match outcome {
            WorkItemOutcome::Completed => self.completed += 1,
            WorkItemOutcome::Failed(_) => self.failed += 1,
            WorkItemOutcome::Interrupted => self.interrupted += 1,
            WorkItemOutcome::NotStarted => self.not_started += 1,
        }
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn total(&self) -> usize {
        self.finished() + self.interrupted + self.not_started
    }

    /// True when every work item of the run reached completed.
    pub fn all_completed(&self) -> bool {
        self.completed == self.total()
    }
}

/// Runs work item processors on an outer pool of `workers` threads.
pub struct Scheduler {
    ctx: Arc<RunContext>,
    workers: usize,
}

impl Scheduler {
    pub fn new(ctx: Arc<RunContext>, workers: usize) -> Self {
        Self {
            ctx,
            workers: workers.max(1),
        }
    }

    pub fn run(&self, keys: Vec<WorkKey>) -> Result<RunReport, WorkerError> {
        let mut report = RunReport::default();
        if keys.is_empty() {
            info!("No work items to process");
            return Ok(report);
        }

        let total = keys.len();
        let width = self.workers.min(total);
        info!("Processing {} work items with {} workers", total, width);

        let processor = Arc::new(WorkItemProcessor::new(Arc::clone(&self.ctx)));
        let cancel = self.ctx.cancel.clone();
        let pool = WorkerPool::new("workitems", width, move |key: WorkKey| {
            if cancel.is_cancelled() {
                return (key, WorkItemOutcome::NotStarted);
            }
            let outcome = processor.process(&key);
            (key, outcome)
        })?;

        for key in keys {
            pool.submit(key)?;
        }

        let started = Instant::now();
        for received in 1..=total {
            let Some(result) = pool.recv_result() else {
                return Err(WorkerError::ChannelClosed);
            };
            match result {
                Ok((key, outcome)) => {
                    if let WorkItemOutcome::Failed(message) = &outcome {
                        warn!("Work item {} failed: {}", key, message);
                    }
                    report.record(&outcome);
                }
                Err(e) => {
                    warn!("Work item worker crashed: {}", e);
                    report.failed += 1;
                }
            }

            if received % PROGRESS_EVERY == 0 || received == total {
                let elapsed = started.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 { received as f64 / elapsed } else { 0.0 };
                info!(
                    "Progress: {}/{} ({} completed, {} failed, {} interrupted) - {:.1} items/sec",
                    received,
                    total,
                    report.completed,
                    report.failed,
                    report.interrupted + report.not_started,
                    rate
                );
            }
        }
        pool.wait();

        if self.ctx.cancel.is_cancelled() {
            warn!(
                "Run interrupted: {} work items reverted to pending, {} not started",
                report.interrupted, report.not_started
            );
        }
        Ok(report)
    }
}
