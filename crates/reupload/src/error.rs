use std::path::PathBuf;
use thiserror::Error;

use crate::partition::PartitionError;

#[derive(Error, Debug)]
pub enum ReuploadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to load manifest: {0}")]
    Manifest(#[from] crate::resolver::ManifestError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid partition settings: {0}")]
    Partition(#[from] PartitionError),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input CSV has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Errors that end a work item attempt early. They never abort the run;
/// the processor records them as a work item failure.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("State store error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("File pool error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error("Failed to install interrupt handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, ReuploadError>;
