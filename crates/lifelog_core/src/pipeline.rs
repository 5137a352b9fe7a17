//! End-to-end processing run: ingest, plan, execute.
//!
//! # Responsibility
//! - Wire the store, ingestor, generator, planner and executor for one run.
//! - Scope the generator client to that run.
//!
//! # Invariants
//! - Plans with duplicate task ids are rejected before execution.
//! - Unknown dependencies and cycles are logged and left to the executor,
//!   which reports the affected tasks as blocked.
//! - A dry run plans but never calls a task handler.

use crate::config::ProcessorConfig;
use crate::executor::{DryRunReport, Executor, RunReport, WorkerPool};
use crate::generate::{build_generator, GenerationError, Generator, ProviderKind, RetryingGenerator};
use crate::ingest::{IngestError, Ingestor};
use crate::model::task::PlanIssue;
use crate::planner::{LlmPlanner, PlanError, Planner};
use crate::repo::StoreError;
use crate::store::StateStore;
use crate::worker::{NoteWorker, WorkerContext};
use crate::writer::IdempotentWriter;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug)]
pub enum PipelineError {
    Store(StoreError),
    Ingest(IngestError),
    /// The generation backend could not be constructed.
    Provider(GenerationError),
    Plan(PlanError),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "state store error: {err}"),
            Self::Ingest(err) => write!(f, "ingestion failed: {err}"),
            Self::Provider(err) => write!(f, "failed to initialize generator: {err}"),
            Self::Plan(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Ingest(err) => Some(err),
            Self::Provider(err) => Some(err),
            Self::Plan(err) => Some(err),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<IngestError> for PipelineError {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl From<PlanError> for PipelineError {
    fn from(value: PlanError) -> Self {
        Self::Plan(value)
    }
}

/// Per-invocation choices, typically from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// `YYYY-MM-DD` labels to ingest and process.
    pub days: Vec<String>,
    /// Overrides the configured provider.
    pub provider: Option<ProviderKind>,
    /// Skip ingestion and work from events already stored.
    pub rebuild_only: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing to execute; carries the reason.
    Skipped(String),
    Executed(RunReport),
    DryRun(DryRunReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub ingested: usize,
    pub events: usize,
    pub planned_tasks: usize,
    pub outcome: RunOutcome,
}

/// Runs the pipeline with the provider selected by `options` or `config`.
pub fn run_pipeline(
    config: &ProcessorConfig,
    options: &PipelineOptions,
) -> PipelineResult<PipelineReport> {
    let kind = options.provider.unwrap_or(config.llm.provider);
    run_inner(config, options, || {
        build_generator(kind, &config.llm).map(Arc::<dyn Generator>::from)
    })
}

/// Runs the pipeline against an already constructed generator.
pub fn run_with_generator(
    config: &ProcessorConfig,
    options: &PipelineOptions,
    generator: Arc<dyn Generator>,
) -> PipelineResult<PipelineReport> {
    run_inner(config, options, move || Ok(generator))
}

fn run_inner<F>(
    config: &ProcessorConfig,
    options: &PipelineOptions,
    make_generator: F,
) -> PipelineResult<PipelineReport>
where
    F: FnOnce() -> Result<Arc<dyn Generator>, GenerationError>,
{
    let store = Arc::new(StateStore::open_for_vault(&config.vault_dir)?);

    let ingested = if options.rebuild_only {
        info!("event=pipeline module=pipeline status=skip stage=ingest reason=rebuild_only");
        0
    } else {
        Ingestor::new(&store, config.events_dir())
            .ingest(&options.days, config.max_events_per_run)?
    };

    let generator = make_generator().map_err(PipelineError::Provider)?;
    let generator: Arc<dyn Generator> = Arc::new(RetryingGenerator::new(
        generator,
        config.llm.retry_policy(),
    ));

    let mut events = Vec::new();
    for day in &options.days {
        events.extend(store.events_for_day(day)?);
    }
    info!(
        "event=pipeline module=pipeline status=ok stage=load days={} events={}",
        options.days.len(),
        events.len()
    );
    if events.is_empty() {
        return Ok(PipelineReport {
            ingested,
            events: 0,
            planned_tasks: 0,
            outcome: RunOutcome::Skipped("no events for the selected days".to_string()),
        });
    }

    let mut plan = LlmPlanner::new(generator.clone()).create_plan(&events)?;
    if plan.is_empty() {
        warn!("event=pipeline module=pipeline status=skip stage=plan reason=empty_plan");
        return Ok(PipelineReport {
            ingested,
            events: events.len(),
            planned_tasks: 0,
            outcome: RunOutcome::Skipped("planner produced no tasks".to_string()),
        });
    }

    for issue in plan.issues() {
        if let PlanIssue::DuplicateTaskId(_) = issue {
            return Err(PlanError::Invalid(issue).into());
        }
        warn!(
            "event=plan_check module=pipeline status=warn issue={}",
            issue
        );
    }

    let executor = Executor::new(config.llm.concurrency);
    let outcome = if options.dry_run {
        RunOutcome::DryRun(executor.dry_run(&plan))
    } else {
        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&store),
            generator,
            writer: IdempotentWriter::with_overwrite(config.overwrite),
            vault_dir: config.vault_dir.clone(),
            data_dir: config.data_dir.clone(),
        });
        let pool = WorkerPool::from_fn(executor.concurrency(), |_| {
            NoteWorker::new(Arc::clone(&ctx))
        });
        RunOutcome::Executed(executor.run(&mut plan, &pool))
    };

    Ok(PipelineReport {
        ingested,
        events: events.len(),
        planned_tasks: plan.len(),
        outcome,
    })
}
