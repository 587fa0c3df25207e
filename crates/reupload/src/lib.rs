pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod input;
pub mod logging;
pub mod model;
pub mod partition;
pub mod resolver;
pub mod runner;
pub mod storage;
pub mod transfer;
pub mod validate;
pub mod worker;

pub use config::{load_config, RunConfig};
pub use context::RunContext;
pub use db::{StateStore, Summary};
pub use error::{ConfigError, InputError, ProcessError, Result, ReuploadError, WorkerError};
pub use model::{FileMetadata, Status, WorkKey};
pub use partition::{belongs, Partition, PartitionError};
pub use resolver::{ManifestResolver, MetadataResolver, ResolveError};
pub use runner::RunOutcome;
pub use storage::{LocalObjectStore, Notifier, ObjectStore, PutOutcome, QueueFileNotifier, StoreError};
pub use transfer::{FileTransfer, Reuploader, RetryPolicy, TransferOutcome};
pub use worker::{CancellationToken, ShutdownCoordinator, WorkItemOutcome};
