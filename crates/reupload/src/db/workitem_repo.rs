//! Work item repository: operations on the `workitems` table.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{now_timestamp, DatabaseError, StateStore};
use crate::model::{Status, WorkKey};

/// A raw work item row from the database.
#[derive(Debug, Clone)]
pub struct WorkItemRow {
    pub workitem_id: String,
    pub job_id: String,
    pub workitem_name: String,
    pub status: Status,
    pub files_total: u64,
    pub files_processed: u64,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl WorkItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            workitem_id: row.get("workitem_id")?,
            job_id: row.get("job_id")?,
            workitem_name: row.get("workitem_name")?,
            status: row.get("status")?,
            files_total: row.get("files_total")?,
            files_processed: row.get("files_processed")?,
            error_message: row.get("error_message")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn key(&self) -> WorkKey {
        WorkKey::new(&self.workitem_id, &self.job_id)
    }
}

/// Inserts a work item in `pending` unless it already exists.
///
/// Returns `true` when a new row was created.
pub fn upsert(db: &StateStore, key: &WorkKey, name: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO workitems (workitem_id, job_id, workitem_name, status)
             VALUES (?1, ?2, ?3, 'pending')",
            params![key.workitem_id, key.job_id, name],
        )?;
        Ok(inserted == 1)
    })
}

/// Inserts many work items in one transaction, skipping existing ones.
///
/// Returns how many rows were created.
pub fn upsert_many<'a, I>(db: &StateStore, items: I) -> Result<usize, DatabaseError>
where
    I: IntoIterator<Item = (&'a WorkKey, &'a str)>,
{
    db.with_conn(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO workitems (workitem_id, job_id, workitem_name, status)
                 VALUES (?1, ?2, ?3, 'pending')",
            )?;
            for (key, name) in items {
                inserted += stmt.execute(params![key.workitem_id, key.job_id, name])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })
}

/// Writes the status unconditionally.
///
/// `in_progress` stamps `started_at`, terminal statuses stamp `completed_at`.
/// The error message is overwritten in every case (`None` clears it).
pub fn set_status(
    db: &StateStore,
    key: &WorkKey,
    status: Status,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        let changed = if status == Status::InProgress {
            conn.execute(
                "UPDATE workitems SET status = ?3, started_at = ?4, error_message = ?5
                 WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id, status, now, error],
            )?
        } else if status.is_terminal() {
            conn.execute(
                "UPDATE workitems SET status = ?3, completed_at = ?4, error_message = ?5
                 WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id, status, now, error],
            )?
        } else {
            conn.execute(
                "UPDATE workitems SET status = ?3, error_message = ?4
                 WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id, status, error],
            )?
        };
        if changed == 0 {
            return Err(DatabaseError::MissingRow {
                entity: "workitem",
                key: key.to_string(),
            });
        }
        Ok(())
    })
}

/// Records the number of unique files resolved for the work item.
pub fn set_files_total(db: &StateStore, key: &WorkKey, total: u64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE workitems SET files_total = ?3 WHERE workitem_id = ?1 AND job_id = ?2",
            params![key.workitem_id, key.job_id, total],
        )?;
        Ok(())
    })
}

pub fn get_status(db: &StateStore, key: &WorkKey) -> Result<Option<Status>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row(
                "SELECT status FROM workitems WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status)
    })
}

pub fn find(db: &StateStore, key: &WorkKey) -> Result<Option<WorkItemRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM workitems WHERE workitem_id = ?1 AND job_id = ?2",
                params![key.workitem_id, key.job_id],
                WorkItemRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All work items that still need work: pending, failed, or left
/// in_progress by an interrupted run.
pub fn pending(db: &StateStore) -> Result<Vec<WorkKey>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT workitem_id, job_id FROM workitems
             WHERE status IN ('pending', 'failed', 'in_progress')
             ORDER BY workitem_id, job_id",
        )?;
        let keys = stmt
            .query_map([], |r| Ok(WorkKey::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    })
}

/// Keys of every work item already in `completed`.
pub fn completed_keys(db: &StateStore) -> Result<HashSet<WorkKey>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT workitem_id, job_id FROM workitems WHERE status = 'completed'")?;
        let keys = stmt
            .query_map([], |r| Ok(WorkKey::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    })
}
