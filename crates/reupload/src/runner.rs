//! One complete run: seed, schedule, report.

use std::sync::Arc;

use log::info;

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::db::{file_repo, stats_repo, workitem_repo, StateStore, Summary};
use crate::error::{ConfigError, Result};
use crate::input;
use crate::model::WorkKey;
use crate::resolver::ManifestResolver;
use crate::storage::{LocalObjectStore, QueueFileNotifier};
use crate::transfer::Reuploader;
use crate::validate::{validate_uploads, ValidationReport};
use crate::worker::{CancellationToken, RunReport, Scheduler, FORCED_EXIT_CODE};

/// Everything a finished (or interrupted) run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub summary: Summary,
    pub interrupted: bool,
    pub validation: Option<ValidationReport>,
}

impl RunOutcome {
    /// 0 when every work item of the run completed, 1 when any failed or was
    /// left pending, 130 when the run was interrupted.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            FORCED_EXIT_CODE as u8
        } else if self.report.all_completed() {
            0
        } else {
            1
        }
    }
}

/// Builds the filesystem-backed collaborators described by `config`.
pub fn build_context(config: &RunConfig, store: StateStore, cancel: CancellationToken) -> Result<RunContext> {
    let resolver = ManifestResolver::load(&config.manifest)?;

    let source = Arc::new(LocalObjectStore::new(&config.source_root));
    let target = Arc::new(LocalObjectStore::new(&config.target_root));
    let mut transfer = Reuploader::new(source, target, &config.target_container)
        .with_retry(config.retry.policy());
    if let Some(queue_file) = &config.queue_file {
        transfer = transfer.with_notifier(Arc::new(QueueFileNotifier::new(queue_file)));
    }

    Ok(RunContext::new(
        store,
        Arc::new(resolver),
        Arc::new(transfer),
        cancel,
        config.file_workers,
    ))
}

/// Opens the state database, builds the local collaborators and runs.
pub fn run(config: &RunConfig, cancel: CancellationToken) -> Result<RunOutcome> {
    let store = StateStore::open_with_pool_size(&config.state_db, config.db_pool_size())?;
    info!("Using state database {}", store.path().display());
    let ctx = build_context(config, store, cancel)?;
    execute(config, Arc::new(ctx))
}

/// Runs against an already built context.
pub fn execute(config: &RunConfig, ctx: Arc<RunContext>) -> Result<RunOutcome> {
    let partition = config.partition().map_err(ConfigError::from)?;
    if let Some(p) = &partition {
        info!("Running partition {}", p);
    }
    let store = &ctx.store;

    if config.resume {
        info!("Resume mode: loading pending work items from state database");
    } else if let Some(csv) = &config.csv {
        let loaded = input::load_workitems(csv, partition.as_ref())?;
        input::seed(store, &loaded.rows)?;
    }

    let keys: Vec<WorkKey> = workitem_repo::pending(store)?
        .into_iter()
        .filter(|key| partition.as_ref().map_or(true, |p| p.contains(&key.workitem_id)))
        .collect();
    info!("{} work items to process", keys.len());

    let rearmed = file_repo::rearm_stranded(store, &keys)?;
    if rearmed > 0 {
        info!("Re-armed {} files left in progress by an earlier run", rearmed);
    }

    let report = Scheduler::new(Arc::clone(&ctx), config.workitem_workers).run(keys)?;
    let interrupted = ctx.cancel.is_cancelled();

    if let (Some(csv), Some(remaining)) = (&config.csv, &config.remaining_csv) {
        input::filter_completed_csv(store, csv, remaining)?;
    }

    let validation = if config.validate_after_run && !interrupted {
        let target = LocalObjectStore::new(&config.target_root);
        Some(validate_uploads(store, &target)?)
    } else {
        None
    };

    Ok(RunOutcome {
        report,
        summary: stats_repo::summary(store)?,
        interrupted,
        validation,
    })
}
