pub mod cancel;
pub mod job;
pub mod pool;
pub mod processor;
pub mod scheduler;

pub use cancel::{CancellationToken, InterruptAction, ShutdownCoordinator, FORCED_EXIT_CODE};
pub use job::{FileResult, WorkItemOutcome};
pub use pool::WorkerPool;
pub use processor::WorkItemProcessor;
pub use scheduler::{RunReport, Scheduler};
