//! Aggregate counts over the state database for end-of-run reporting.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::{DatabaseError, StateStore};
use crate::model::Status;

/// How many distinct failure messages the summary keeps.
const TOP_ERRORS: usize = 5;

/// Snapshot of progress across the whole state database.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    /// Most frequent work item failure messages with their counts.
    pub top_errors: Vec<(String, u64)>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "REUPLOAD SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total WorkItems:       {}", self.total)?;
        writeln!(f, "  Completed:           {}", self.completed)?;
        writeln!(f, "  Failed:              {}", self.failed)?;
        writeln!(f, "  In Progress:         {}", self.in_progress)?;
        writeln!(f, "  Pending:             {}", self.pending)?;
        writeln!(f)?;
        writeln!(f, "Total Files:           {}", self.total_files)?;
        writeln!(f, "  Processed:           {}", self.processed_files)?;
        writeln!(f, "  Failed:              {}", self.failed_files)?;
        if !self.top_errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Top errors:")?;
            for (message, count) in &self.top_errors {
                writeln!(f, "  [{count}] {message}")?;
            }
        }
        write!(f, "{rule}")
    }
}

pub fn summary(db: &StateStore) -> Result<Summary, DatabaseError> {
    db.with_conn(|conn| {
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM workitems GROUP BY status")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?;
            for row in rows {
                let (status, count) = row?;
                by_status.insert(status, count);
            }
        }

        let count_of = |s: Status| by_status.get(s.as_str()).copied().unwrap_or(0);

        let (total_files, processed_files, failed_files): (u64, u64, u64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0)
             FROM files",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT error_message, COUNT(*) AS cnt FROM workitems
             WHERE status = 'failed' AND error_message IS NOT NULL
             GROUP BY error_message
             ORDER BY cnt DESC, error_message
             LIMIT ?1",
        )?;
        let top_errors = stmt
            .query_map([TOP_ERRORS as i64], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Summary {
            total: by_status.values().sum(),
            pending: count_of(Status::Pending),
            in_progress: count_of(Status::InProgress),
            completed: count_of(Status::Completed),
            failed: count_of(Status::Failed),
            total_files,
            processed_files,
            failed_files,
            top_errors,
        })
    })
}
