use crate::transfer::TransferOutcome;

/// Result of one file job on the inner pool.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub filename: String,
    pub outcome: TransferOutcome,
    /// Set when the terminal status could not be written.
    pub record_error: Option<String>,
}

impl FileResult {
    /// The message this file contributes to its work item's failure, if any.
    pub fn failure(&self) -> Option<String> {
        match (&self.outcome, &self.record_error) {
            (TransferOutcome::Failed(message), _) => Some(message.clone()),
            (_, Some(e)) => Some(format!("State update failed: {e}")),
            _ => None,
        }
    }
}

/// How processing one work item ended in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItemOutcome {
    Completed,
    Failed(String),
    /// Cancelled mid-flight and reverted to pending. Counts as neither
    /// completed nor failed.
    Interrupted,
    /// Never started because cancellation came first.
    NotStarted,
}
