//! Work item lists in CSV form.
//!
//! Headers are matched by name, accepting both `WorkItemId` and
//! `workitem_id` spellings (same for the name and job columns).

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{info, warn};

use crate::db::{workitem_repo, StateStore};
use crate::error::InputError;
use crate::model::WorkKey;
use crate::partition::Partition;

const ID_COLUMNS: [&str; 2] = ["WorkItemId", "workitem_id"];
const NAME_COLUMNS: [&str; 2] = ["WorkItemName", "workitem_name"];
const JOB_COLUMNS: [&str; 2] = ["JobId", "job_id"];

/// One usable input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRow {
    pub key: WorkKey,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedInput {
    pub rows: Vec<InputRow>,
    /// Rows without a work item id or job id.
    pub skipped_invalid: usize,
    /// Rows belonging to another partition.
    pub skipped_partition: usize,
}

/// Column positions resolved from the header row.
struct Columns {
    id: usize,
    job: usize,
    name: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, InputError> {
        let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.trim()));
        Ok(Self {
            id: find(&ID_COLUMNS).ok_or(InputError::MissingColumn(ID_COLUMNS[0]))?,
            job: find(&JOB_COLUMNS).ok_or(InputError::MissingColumn(JOB_COLUMNS[0]))?,
            name: find(&NAME_COLUMNS),
        })
    }

    /// The work key of a record, if both id and job are present.
    fn key(&self, record: &StringRecord) -> Option<WorkKey> {
        let id = field(record, Some(self.id))?;
        let job = field(record, Some(self.job))?;
        Some(WorkKey::new(id, job))
    }
}

fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ReaderBuilder::new().flexible(true).from_reader(file))
}

/// Reads work items from `path`, keeping only those in `partition`.
///
/// Rows missing the id or job are skipped with a warning. A missing name
/// falls back to the id.
pub fn load_workitems(path: &Path, partition: Option<&Partition>) -> Result<LoadedInput, InputError> {
    let mut reader = open_reader(path)?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut loaded = LoadedInput::default();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let Some(key) = columns.key(&record) else {
            warn!("Skipping row {} with missing data: {:?}", line + 2, record);
            loaded.skipped_invalid += 1;
            continue;
        };

        if let Some(partition) = partition {
            if !partition.contains(&key.workitem_id) {
                loaded.skipped_partition += 1;
                continue;
            }
        }

        let name = match field(&record, columns.name) {
            Some(name) => name.to_string(),
            None => {
                warn!("No WorkItemName for {}, using WorkItemId as name", key.workitem_id);
                key.workitem_id.clone()
            }
        };
        loaded.rows.push(InputRow { key, name });
    }

    match partition {
        Some(p) => info!(
            "Loaded {} work items from {} for partition {} (skipped {} from other partitions)",
            loaded.rows.len(),
            path.display(),
            p,
            loaded.skipped_partition
        ),
        None => info!("Loaded {} work items from {}", loaded.rows.len(), path.display()),
    }
    Ok(loaded)
}

/// Inserts the loaded rows into the state store. Existing rows keep their
/// status. Returns how many new work items were created.
pub fn seed(store: &StateStore, rows: &[InputRow]) -> Result<usize, InputError> {
    let created = workitem_repo::upsert_many(store, rows.iter().map(|r| (&r.key, r.name.as_str())))?;
    info!(
        "Seeded {} new work items ({} already known)",
        created,
        rows.len() - created
    );
    Ok(created)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub total: usize,
    pub filtered: usize,
    pub remaining: usize,
}

/// Copies `input` to `output` without rows whose work item is completed in
/// the state store. The header and all columns are preserved.
pub fn filter_completed_csv(store: &StateStore, input: &Path, output: &Path) -> Result<FilterReport, InputError> {
    let completed = workitem_repo::completed_keys(store)?;

    let mut reader = open_reader(input)?;
    let headers = reader.headers()?.clone();
    let columns = Columns::from_headers(&headers)?;

    let out = File::create(output).map_err(|source| InputError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    let mut writer = WriterBuilder::new().flexible(true).from_writer(out);
    writer.write_record(&headers)?;

    let mut report = FilterReport::default();
    for record in reader.records() {
        let record = record?;
        report.total += 1;

        let done = columns.key(&record).is_some_and(|key| completed.contains(&key));
        if done {
            report.filtered += 1;
        } else {
            writer.write_record(&record)?;
            report.remaining += 1;
        }
    }
    writer.flush().map_err(|source| InputError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    info!(
        "Filtered {} of {} rows, {} remaining written to {}",
        report.filtered,
        report.total,
        report.remaining,
        output.display()
    );
    Ok(report)
}
