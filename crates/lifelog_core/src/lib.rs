//! Core of the lifelog processor.
//!
//! Turns captured activity logs into vault notes: incremental ingestion into
//! a SQLite event store, LLM-backed planning, dependency-scheduled execution
//! on a bounded worker pool, and idempotent note writes.

pub mod config;
pub mod db;
pub mod executor;
pub mod generate;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod planner;
pub mod repo;
pub mod retry;
pub mod store;
pub mod vault;
pub mod worker;
pub mod writer;

pub use config::{LlmConfig, ProcessorConfig};
pub use executor::{
    AbortHandle, DryRunReport, Executor, RunReport, TaskError, TaskHandler, TaskOutcome,
    TaskResult, WorkerPool,
};
pub use generate::{
    build_generator, GenerationError, GenerationErrorKind, GenerationResult, Generator,
    ProviderKind, RetryingGenerator,
};
pub use ingest::{discover_days, IngestError, Ingestor};
pub use logging::{default_log_level, init_logging, init_logging_with_stderr, logging_status};
pub use model::artifact::{Artifact, IngestionCursor};
pub use model::event::Event;
pub use model::task::{Plan, PlanIssue, Task, TaskStatus, TaskType};
pub use pipeline::{
    run_pipeline, run_with_generator, PipelineError, PipelineOptions, PipelineReport, RunOutcome,
};
pub use planner::{LlmPlanner, PlanError, Planner};
pub use repo::{StoreError, StoreResult};
pub use retry::{with_retry, Retriable, RetryPolicy};
pub use store::StateStore;
pub use worker::{NoteWorker, WorkerContext};
pub use writer::{content_sha, IdempotentWriter, WriteError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
