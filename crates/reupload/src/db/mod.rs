//! Durable state store for work items and files.
//!
//! Uses rusqlite (SQLite) behind an r2d2 pool. Every operation checks out
//! its own connection for the duration of one statement or one short
//! transaction and returns it on drop, so no connection is ever shared
//! between threads. Conflicting writes are serialized by SQLite itself
//! (WAL mode plus a busy timeout), not by an application-level mutex.

use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub mod error;
pub mod file_repo;
pub mod migrations;
pub mod stats_repo;
pub mod workitem_repo;

pub use error::DatabaseError;
pub use file_repo::FileRow;
pub use stats_repo::Summary;
pub use workitem_repo::WorkItemRow;

/// How long a writer waits on SQLite's lock before the call fails.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: u32 = 32;

/// Cloneable handle to the state database.
///
/// Cloning is cheap (the pool is reference counted). Hand one clone to each
/// worker; connections are acquired per call through [`StateStore::with_conn`].
#[derive(Clone)]
pub struct StateStore {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl StateStore {
    /// Opens (or creates) the state database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool_size(path: &Path, pool_size: u32) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys=ON;")
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .min_idle(Some(1))
            .connection_timeout(BUSY_TIMEOUT)
            .build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            migrations::run_all(&conn)?;
        }

        log::info!("State database opened at {}", path.display());

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with a connection checked out of the pool. The connection
    /// goes back to the pool when `f` returns, whatever the outcome.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError>,
    {
        let mut conn: PooledConnection<SqliteConnectionManager> = self.pool.get()?;
        f(&mut *conn)
    }
}

/// Current UTC time in RFC 3339, the format used for every timestamp column.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::StateStore;
    use tempfile::TempDir;

    /// Opens a fresh store in a temp directory. Keep the `TempDir` alive for
    /// as long as the store is used.
    pub fn temp_store() -> (TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.db")).unwrap();
        (dir, store)
    }
}
