//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from state store operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No connection could be acquired from the pool in time.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A row referenced by an update does not exist.
    #[error("No {entity} row for {key}")]
    MissingRow { entity: &'static str, key: String },
}
