//! File repository: per-file rows and the claim primitive.
//!
//! `claim` is the only concurrency control in the system. It is one
//! conditional UPDATE, so SQLite's write lock decides which of several
//! racing callers performs the `pending|failed -> in_progress` transition.

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{now_timestamp, DatabaseError, StateStore};
use crate::model::{Status, WorkKey};

/// A raw file row from the database.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub workitem_id: String,
    pub job_id: String,
    pub filename: String,
    pub source_uri: String,
    pub status: Status,
    pub error_message: Option<String>,
    pub uploaded_at: Option<String>,
    pub claim_count: u64,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            workitem_id: row.get("workitem_id")?,
            job_id: row.get("job_id")?,
            filename: row.get("filename")?,
            source_uri: row.get("source_uri")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            uploaded_at: row.get("uploaded_at")?,
            claim_count: row.get("claim_count")?,
        })
    }
}

/// A completed file joined with its work item's name.
#[derive(Debug, Clone)]
pub struct CompletedFile {
    pub key: WorkKey,
    pub workitem_name: String,
    pub filename: String,
}

/// Inserts a file in `pending` unless it already exists.
///
/// Returns `true` when a new row was created.
pub fn upsert(
    db: &StateStore,
    key: &WorkKey,
    filename: &str,
    source_uri: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO files (workitem_id, job_id, filename, source_uri, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![key.workitem_id, key.job_id, filename, source_uri],
        )?;
        Ok(inserted == 1)
    })
}

/// Atomically moves a file from `pending`/`failed` to `in_progress`.
///
/// Returns `true` only for the caller whose update changed the row.
pub fn claim(db: &StateStore, key: &WorkKey, filename: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files
             SET status = 'in_progress', error_message = NULL,
                 claim_count = claim_count + 1
             WHERE workitem_id = ?1 AND job_id = ?2 AND filename = ?3
               AND status IN ('pending', 'failed')",
            params![key.workitem_id, key.job_id, filename],
        )?;
        Ok(changed == 1)
    })
}

/// Writes a file's status. A transition into `completed` stamps
/// `uploaded_at` and bumps the parent's `files_processed` in the same
/// transaction; re-completing an already completed file is a no-op.
pub fn set_status(
    db: &StateStore,
    key: &WorkKey,
    filename: &str,
    status: Status,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE files SET status = ?4, error_message = ?5,
                 uploaded_at = CASE WHEN ?4 = 'completed' THEN ?6 ELSE uploaded_at END
             WHERE workitem_id = ?1 AND job_id = ?2 AND filename = ?3
               AND NOT (status = 'completed' AND ?4 = 'completed')",
            params![key.workitem_id, key.job_id, filename, status, error, now],
        )?;

        if changed == 1 && status == Status::Completed {
            tx.execute(
                "UPDATE workitems SET files_processed = files_processed + 1
                 WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    })
}

/// Returns a claimed file to `pending` without touching its error message.
/// Used for claims that were never dispatched.
pub fn release_claim(db: &StateStore, key: &WorkKey, filename: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET status = 'pending'
             WHERE workitem_id = ?1 AND job_id = ?2 AND filename = ?3
               AND status = 'in_progress'",
            params![key.workitem_id, key.job_id, filename],
        )?;
        Ok(changed == 1)
    })
}

/// Re-arms files of the given work items stuck in `in_progress` back to
/// `pending`.
///
/// Only safe while no processor is running against these work items, which
/// holds at the start of a run for the items that run owns.
pub fn rearm_stranded(db: &StateStore, keys: &[WorkKey]) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE files SET status = 'pending', error_message = 'Re-armed after interrupted run'
                 WHERE workitem_id = ?1 AND job_id = ?2 AND status = 'in_progress'",
            )?;
            for key in keys {
                changed += stmt.execute(params![key.workitem_id, key.job_id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    })
}

pub fn get_status(
    db: &StateStore,
    key: &WorkKey,
    filename: &str,
) -> Result<Option<Status>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row(
                "SELECT status FROM files WHERE workitem_id = ?1 AND job_id = ?2 AND filename = ?3",
                params![key.workitem_id, key.job_id, filename],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status)
    })
}

pub fn find(db: &StateStore, key: &WorkKey, filename: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM files WHERE workitem_id = ?1 AND job_id = ?2 AND filename = ?3",
                params![key.workitem_id, key.job_id, filename],
                FileRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All files recorded for a work item, ordered by filename.
pub fn list_for_workitem(db: &StateStore, key: &WorkKey) -> Result<Vec<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE workitem_id = ?1 AND job_id = ?2 ORDER BY filename",
        )?;
        let rows = stmt
            .query_map(params![key.workitem_id, key.job_id], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Every completed file with the name of its work item.
pub fn completed_files(db: &StateStore) -> Result<Vec<CompletedFile>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT w.workitem_id, w.job_id, w.workitem_name, f.filename
             FROM files f
             JOIN workitems w ON f.workitem_id = w.workitem_id AND f.job_id = w.job_id
             WHERE f.status = 'completed'
             ORDER BY w.workitem_id, f.filename",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(CompletedFile {
                    key: WorkKey::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?),
                    workitem_name: r.get(2)?,
                    filename: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
