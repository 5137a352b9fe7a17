//! Dependency-scheduled plan execution.
//!
//! # Responsibility
//! - Run every task whose dependencies have completed, as soon as they have.
//! - Bound concurrency by a [`WorkerPool`] of reusable handlers.
//! - Report final status per task, separating failed from blocked.
//!
//! # Invariants
//! - A task is submitted at most once per run and never before all of its
//!   dependencies are `Completed`.
//! - Only the scheduling thread mutates task statuses.
//! - A run ends when nothing is in flight and no task became ready, so
//!   cyclic or dangling dependencies leave tasks `Pending` instead of hanging.
//! - A failing or panicking handler fails only its own task.

pub mod pool;

pub use pool::{PooledWorker, WorkerPool};

use crate::generate::GenerationError;
use crate::model::task::{Plan, Task, TaskStatus};
use crate::repo::StoreError;
use crate::writer::WriteError;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

pub type TaskResult<T> = Result<T, TaskError>;

/// Failure of a single task. Never escapes the task's own outcome.
#[derive(Debug)]
pub enum TaskError {
    Generation(GenerationError),
    Write(WriteError),
    Store(StoreError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The task's inputs do not allow it to run.
    MissingInput(String),
    UnsupportedTaskType(String),
    /// The handler panicked; carries the panic message.
    Panicked(String),
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation(err) => write!(f, "generation failed: {err}"),
            Self::Write(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Io { path, source } => write!(f, "failed to read `{}`: {source}", path.display()),
            Self::MissingInput(message) => write!(f, "missing input: {message}"),
            Self::UnsupportedTaskType(task_type) => {
                write!(f, "unsupported task type `{task_type}`")
            }
            Self::Panicked(message) => write!(f, "handler panicked: {message}"),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Generation(err) => Some(err),
            Self::Write(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::MissingInput(_) | Self::UnsupportedTaskType(_) | Self::Panicked(_) => None,
        }
    }
}

impl From<GenerationError> for TaskError {
    fn from(value: GenerationError) -> Self {
        Self::Generation(value)
    }
}

impl From<WriteError> for TaskError {
    fn from(value: WriteError) -> Self {
        Self::Write(value)
    }
}

impl From<StoreError> for TaskError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Executes one task. Handlers are pooled and reused across tasks.
pub trait TaskHandler: Send {
    /// Returns an optional short result recorded on the task.
    fn execute(&mut self, task: &Task) -> TaskResult<Option<String>>;
}

/// Stops a run between readiness rounds. In-flight tasks still finish.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final state of one task after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// `Pending` at the end of the run: never became ready.
    pub blocked: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub aborted: bool,
}

impl RunReport {
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|outcome| outcome.task_id == task_id)
    }
}

/// What a run would do, without running anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DryRunReport {
    /// Task ids grouped by the readiness round they would be submitted in.
    pub rounds: Vec<Vec<String>>,
    /// Tasks that could never become ready.
    pub blocked: Vec<String>,
}

impl DryRunReport {
    /// Submission order, round by round.
    pub fn order(&self) -> Vec<&str> {
        self.rounds.iter().flatten().map(String::as_str).collect()
    }
}

type Job = (usize, Task);
type Completion = (usize, TaskResult<Option<String>>);

pub struct Executor {
    concurrency: usize,
    abort: AbortHandle,
}

impl Executor {
    /// `concurrency` below 1 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            abort: AbortHandle::default(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Runs `plan` to its terminal state, updating task statuses in place.
    ///
    /// Tasks already `Completed` count as satisfied dependencies and are not
    /// run again. Every other task is reset to `Pending` and scheduled anew.
    pub fn run<W: TaskHandler>(&self, plan: &mut Plan, pool: &WorkerPool<W>) -> RunReport {
        let started_at = Instant::now();
        let total = plan.tasks.len();
        for task in plan
            .tasks
            .iter_mut()
            .filter(|task| task.status != TaskStatus::Completed)
        {
            task.status = TaskStatus::Pending;
            task.result = None;
        }
        let mut claimed = completed_flags(plan);
        let mut completed = completed_ids(plan);
        let mut errors: Vec<Option<String>> = vec![None; total];
        let mut aborted = false;

        if pool.capacity() == 0 && claimed.iter().any(|done| !done) {
            error!(
                "event=plan_run module=executor status=error reason=empty_pool tasks={}",
                total
            );
            return build_report(plan, errors, aborted);
        }

        info!(
            "event=plan_run module=executor status=start tasks={} concurrency={} pool={}",
            total,
            self.concurrency,
            pool.capacity()
        );

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let job_rx = Mutex::new(job_rx);
        let dispatchers = self.concurrency.min(total);

        std::thread::scope(|scope| {
            for _ in 0..dispatchers {
                let job_rx = &job_rx;
                let done_tx = done_tx.clone();
                scope.spawn(move || dispatch_loop(job_rx, pool, done_tx));
            }
            drop(done_tx);

            let mut in_flight = 0usize;
            loop {
                if !aborted && self.abort.is_aborted() {
                    aborted = true;
                    warn!(
                        "event=plan_run module=executor status=abort in_flight={}",
                        in_flight
                    );
                }

                if !aborted {
                    for index in ready_indices(plan, &claimed, &completed) {
                        claimed[index] = true;
                        let task = &mut plan.tasks[index];
                        task.status = TaskStatus::Running;
                        info!(
                            "event=task_submit module=executor status=ok task_id={} task_type={}",
                            task.task_id, task.task_type
                        );
                        if job_tx.send((index, task.clone())).is_err() {
                            task.status = TaskStatus::Failed;
                            errors[index] = Some("no dispatcher available".to_string());
                            continue;
                        }
                        in_flight += 1;
                    }
                }

                if in_flight == 0 {
                    break;
                }

                let Ok((index, result)) = done_rx.recv() else {
                    break;
                };
                in_flight -= 1;

                let task = &mut plan.tasks[index];
                match result {
                    Ok(summary) => {
                        task.status = TaskStatus::Completed;
                        task.result = summary;
                        completed.insert(task.task_id.clone());
                        info!(
                            "event=task_done module=executor status=ok task_id={}",
                            task.task_id
                        );
                    }
                    Err(err) => {
                        task.status = TaskStatus::Failed;
                        error!(
                            "event=task_done module=executor status=error task_id={} error={}",
                            task.task_id, err
                        );
                        errors[index] = Some(err.to_string());
                    }
                }
            }

            drop(job_tx);
        });

        let report = build_report(plan, errors, aborted);
        info!(
            "event=plan_run module=executor status=ok completed={} failed={} blocked={} aborted={} duration_ms={}",
            report.completed,
            report.failed,
            report.blocked,
            report.aborted,
            started_at.elapsed().as_millis()
        );
        report
    }

    /// Replays the readiness bookkeeping of [`Executor::run`], assuming every
    /// submitted task succeeds. No handler is called and `plan` is untouched.
    pub fn dry_run(&self, plan: &Plan) -> DryRunReport {
        let mut claimed = completed_flags(plan);
        let mut completed = completed_ids(plan);
        let mut rounds = Vec::new();

        loop {
            let ready = ready_indices(plan, &claimed, &completed);
            if ready.is_empty() {
                break;
            }
            let mut round = Vec::with_capacity(ready.len());
            for index in ready {
                claimed[index] = true;
                round.push(plan.tasks[index].task_id.clone());
            }
            for task_id in &round {
                info!(
                    "event=task_submit module=executor status=dry_run task_id={}",
                    task_id
                );
                completed.insert(task_id.clone());
            }
            rounds.push(round);
        }

        let blocked = plan
            .tasks
            .iter()
            .zip(&claimed)
            .filter(|(_, claimed)| !**claimed)
            .map(|(task, _)| task.task_id.clone())
            .collect();

        DryRunReport { rounds, blocked }
    }
}

/// Tasks already `Completed` start out claimed; everything else is eligible.
fn completed_flags(plan: &Plan) -> Vec<bool> {
    plan.tasks
        .iter()
        .map(|task| task.status == TaskStatus::Completed)
        .collect()
}

fn completed_ids(plan: &Plan) -> HashSet<String> {
    plan.tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .map(|task| task.task_id.clone())
        .collect()
}

fn ready_indices(plan: &Plan, claimed: &[bool], completed: &HashSet<String>) -> Vec<usize> {
    plan.tasks
        .iter()
        .enumerate()
        .filter(|(index, task)| {
            !claimed[*index] && task.dependencies.iter().all(|dep| completed.contains(dep))
        })
        .map(|(index, _)| index)
        .collect()
}

fn dispatch_loop<W: TaskHandler>(
    jobs: &Mutex<mpsc::Receiver<Job>>,
    pool: &WorkerPool<W>,
    done: mpsc::Sender<Completion>,
) {
    loop {
        let job = jobs.lock().recv();
        let Ok((index, task)) = job else {
            return;
        };

        let result = {
            let mut worker = pool.acquire();
            catch_unwind(AssertUnwindSafe(|| worker.execute(&task)))
                .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))))
        };

        if done.send((index, result)).is_err() {
            return;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn build_report(plan: &Plan, errors: Vec<Option<String>>, aborted: bool) -> RunReport {
    let mut report = RunReport {
        aborted,
        ..RunReport::default()
    };

    for (task, error) in plan.tasks.iter().zip(errors) {
        let blocked = task.status == TaskStatus::Pending;
        match task.status {
            TaskStatus::Completed => report.completed += 1,
            TaskStatus::Pending => report.blocked += 1,
            // A run only returns once nothing is in flight.
            TaskStatus::Failed | TaskStatus::Running => report.failed += 1,
        }
        report.outcomes.push(TaskOutcome {
            task_id: task.task_id.clone(),
            status: task.status,
            blocked,
            error,
        });
    }

    report
}
