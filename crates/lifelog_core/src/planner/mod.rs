//! Planning collaborator: turns a timeline of events into a [`Plan`].
//!
//! # Responsibility
//! - Render events as a compact, id-bearing timeline.
//! - Ask the generator for a task list and decode it.
//!
//! # Invariants
//! - Returned tasks start `Pending` with no result, whatever the generator
//!   claims.
//! - An empty event list yields an empty plan without a generation call.

use crate::generate::{generate_json, GenerationError, Generator};
use crate::model::event::{Event, AUDIO_SEGMENT_EVENT, PAGE_TEXT_EVENT};
use crate::model::task::{Plan, PlanIssue, TaskStatus};
use crate::vault::prompts::{task_plan_user, TASK_PLAN_SYSTEM};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const TIMESTAMP_CHARS: usize = 19;
const PREVIEW_CHARS: usize = 100;
const TRANSCRIPT_CHARS: usize = 200;

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug)]
pub enum PlanError {
    Generation(GenerationError),
    Invalid(PlanIssue),
}

impl Display for PlanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation(err) => write!(f, "planning failed: {err}"),
            Self::Invalid(issue) => write!(f, "invalid plan: {issue}"),
        }
    }
}

impl Error for PlanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Generation(err) => Some(err),
            Self::Invalid(issue) => Some(issue),
        }
    }
}

impl From<GenerationError> for PlanError {
    fn from(value: GenerationError) -> Self {
        Self::Generation(value)
    }
}

/// Produces a plan for a set of events.
pub trait Planner: Send + Sync {
    fn create_plan(&self, events: &[Event]) -> PlanResult<Plan>;
}

/// Planner backed by a [`Generator`].
pub struct LlmPlanner {
    generator: Arc<dyn Generator>,
}

impl LlmPlanner {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

impl Planner for LlmPlanner {
    fn create_plan(&self, events: &[Event]) -> PlanResult<Plan> {
        if events.is_empty() {
            return Ok(Plan::default());
        }

        let timeline = build_timeline(events);
        info!(
            "event=plan module=planner status=start events={} provider={}",
            events.len(),
            self.generator.name()
        );
        let mut plan: Plan = generate_json(
            self.generator.as_ref(),
            TASK_PLAN_SYSTEM,
            &task_plan_user(&timeline),
        )?;
        for task in &mut plan.tasks {
            task.status = TaskStatus::Pending;
            task.result = None;
        }
        info!(
            "event=plan module=planner status=ok tasks={}",
            plan.len()
        );
        Ok(plan)
    }
}

/// Renders one line per event: `- <ts> [id:<id>] [<type>]`, followed by the
/// title and a text preview for captured pages or a transcript excerpt for
/// audio segments.
pub fn build_timeline(events: &[Event]) -> String {
    events
        .iter()
        .map(|event| {
            let ts: String = event.timestamp.chars().take(TIMESTAMP_CHARS).collect();
            let mut line = format!("- {ts} [id:{}] [{}]", event.id, event.kind);
            if event.kind == PAGE_TEXT_EVENT {
                let title = event.meta_str("title").unwrap_or("?");
                let preview: String = event
                    .meta_str("text_preview")
                    .unwrap_or("")
                    .chars()
                    .take(PREVIEW_CHARS)
                    .collect();
                line.push_str(&format!(" {title} -- {preview}..."));
            } else if event.kind == AUDIO_SEGMENT_EVENT {
                let transcript: String = event
                    .meta_str("transcript_text")
                    .unwrap_or("")
                    .chars()
                    .take(TRANSCRIPT_CHARS)
                    .collect();
                if !transcript.trim().is_empty() {
                    line.push_str(&format!(" {}...", transcript.trim()));
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
