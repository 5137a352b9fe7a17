//! Task handlers that materialize vault notes.
//!
//! # Responsibility
//! - Resolve a task's events, generate note content, and write it through
//!   the idempotent writer.
//! - Record what was written in the artifact, concept and page registries.
//!
//! # Invariants
//! - Workers share one [`WorkerContext`]; each holds no per-task state.
//! - Every write passes the last recorded hash for its artifact key, so
//!   re-rendering identical content touches nothing on disk.

use crate::executor::{TaskError, TaskHandler, TaskResult};
use crate::generate::{generate_json, Generator};
use crate::model::artifact::Artifact;
use crate::model::event::Event;
use crate::model::task::{Task, TaskType};
use crate::store::StateStore;
use crate::vault::paths::{concept_note_path, question_note_path};
use crate::vault::prompts::{
    concept_note_user, extract_concept_user, generate_questions_user, CONCEPT_NOTE_SYSTEM,
    EXTRACT_CONCEPT_SYSTEM, GENERATE_QUESTIONS_SYSTEM,
};
use crate::writer::{content_sha, IdempotentWriter};
use log::{info, warn};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const TIMESTAMP_CHARS: usize = 19;

/// Collaborators shared by every worker of a run.
pub struct WorkerContext {
    pub store: Arc<StateStore>,
    pub generator: Arc<dyn Generator>,
    pub writer: IdempotentWriter,
    pub vault_dir: PathBuf,
    /// Root that `meta.text_path` of page events is relative to.
    pub data_dir: PathBuf,
}

#[derive(Deserialize)]
struct ConceptReply {
    concept: String,
}

#[derive(Deserialize)]
struct NoteReply {
    content: String,
}

#[derive(Deserialize)]
struct QuestionsReply {
    questions_markdown: String,
}

/// Pooled handler for `CREATE_OR_UPDATE_NOTE` and `GENERATE_QUESTIONS`.
pub struct NoteWorker {
    ctx: Arc<WorkerContext>,
}

impl NoteWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    fn create_or_update_note(&self, task: &Task) -> TaskResult<Option<String>> {
        let events = self.ctx.store.events_by_ids(&task.related_event_ids)?;
        if events.is_empty() {
            warn!(
                "event=note_task module=worker status=skip reason=no_events task_id={}",
                task.task_id
            );
            return Ok(Some("skipped: no events".to_string()));
        }

        let full_text = self.gather_page_text(&events)?;
        if full_text.trim().is_empty() {
            warn!(
                "event=note_task module=worker status=skip reason=no_text task_id={}",
                task.task_id
            );
            return Ok(Some("skipped: no text".to_string()));
        }

        let reply: ConceptReply = generate_json(
            self.ctx.generator.as_ref(),
            EXTRACT_CONCEPT_SYSTEM,
            &extract_concept_user(&full_text),
        )?;
        let concept = reply.concept.replace('"', "").trim().to_string();
        if concept.is_empty() {
            return Err(TaskError::MissingInput(
                "generator returned an empty concept name".to_string(),
            ));
        }
        info!(
            "event=note_task module=worker status=concept task_id={} concept={}",
            task.task_id, concept
        );

        let path = concept_note_path(&self.ctx.vault_dir, &concept);
        let existing = read_optional(&path)?;
        let titles = self.ctx.store.concept_titles()?;
        let note: NoteReply = generate_json(
            self.ctx.generator.as_ref(),
            CONCEPT_NOTE_SYSTEM,
            &concept_note_user(&full_text, &titles, existing.as_deref()),
        )?;

        let key = format!("concept:{concept}");
        let known = self.ctx.store.artifact_sha(&key)?;
        let sha = self.ctx.writer.write(&path, &note.content, known.as_deref())?;

        let last_seen = events
            .last()
            .map(|event| truncate_ts(&event.timestamp))
            .unwrap_or_default();
        self.ctx.store.set_artifact(&Artifact::new(
            key.clone(),
            "concept",
            path.to_string_lossy(),
            sha.clone(),
        ))?;
        self.ctx
            .store
            .upsert_concept(&concept, &concept, &sha, &last_seen)?;

        info!(
            "event=note_task module=worker status=ok task_id={} path={}",
            task.task_id,
            path.display()
        );
        Ok(Some(key))
    }

    fn generate_questions(&self, task: &Task) -> TaskResult<Option<String>> {
        let concept = quoted_concept(&task.description).ok_or_else(|| {
            TaskError::MissingInput(format!(
                "no quoted concept name in description `{}`",
                task.description
            ))
        })?;

        let note_path = concept_note_path(&self.ctx.vault_dir, concept);
        let note = read_optional(&note_path)?.ok_or_else(|| {
            TaskError::MissingInput(format!("concept note `{}` not found", note_path.display()))
        })?;

        let reply: QuestionsReply = generate_json(
            self.ctx.generator.as_ref(),
            GENERATE_QUESTIONS_SYSTEM,
            &generate_questions_user(concept, &note),
        )?;

        let path = question_note_path(&self.ctx.vault_dir, concept);
        let key = format!("question:{concept}");
        let known = self.ctx.store.artifact_sha(&key)?;
        let sha = self
            .ctx
            .writer
            .write(&path, &reply.questions_markdown, known.as_deref())?;
        self.ctx.store.set_artifact(&Artifact::new(
            key.clone(),
            "question",
            path.to_string_lossy(),
            sha,
        ))?;

        info!(
            "event=questions_task module=worker status=ok task_id={} path={}",
            task.task_id,
            path.display()
        );
        Ok(Some(key))
    }

    /// Concatenates the captured text of every event carrying
    /// `meta.text_path`, registering each source page along the way.
    fn gather_page_text(&self, events: &[Event]) -> TaskResult<String> {
        let mut full_text = String::new();
        for event in events {
            let Some(text_path) = event.meta_str("text_path") else {
                continue;
            };
            let Some(content_path) = resolve_text_path(&self.ctx.data_dir, text_path) else {
                warn!(
                    "event=page_text module=worker status=skip reason=outside_data_dir event_id={}",
                    event.id
                );
                continue;
            };
            let Some(text) = read_optional(&content_path)? else {
                warn!(
                    "event=page_text module=worker status=skip reason=missing path={}",
                    content_path.display()
                );
                continue;
            };

            let title = event.meta_str("title");
            full_text.push_str(&format!(
                "\n\n---\n\nURL: {}\nTitle: {}\n\n",
                event.url.as_deref().unwrap_or(""),
                title.unwrap_or("")
            ));
            full_text.push_str(&text);

            if let Some(url) = event.url.as_deref() {
                self.ctx.store.upsert_page(
                    url,
                    title,
                    &content_sha(&text),
                    &truncate_ts(&event.timestamp),
                )?;
            }
        }
        Ok(full_text)
    }
}

impl TaskHandler for NoteWorker {
    fn execute(&mut self, task: &Task) -> TaskResult<Option<String>> {
        match &task.task_type {
            TaskType::CreateOrUpdateNote => self.create_or_update_note(task),
            TaskType::GenerateQuestions => self.generate_questions(task),
            TaskType::Other(other) => Err(TaskError::UnsupportedTaskType(other.clone())),
        }
    }
}

/// Text between the first pair of single quotes, e.g. the `X` in
/// `Generate questions for 'X'`.
pub fn quoted_concept(description: &str) -> Option<&str> {
    description
        .split('\'')
        .nth(1)
        .map(str::trim)
        .filter(|concept| !concept.is_empty())
}

/// Joins a relative `text_path` onto `data_dir`; rejects absolute paths and
/// parent-directory components.
fn resolve_text_path(data_dir: &Path, text_path: &str) -> Option<PathBuf> {
    let relative = Path::new(text_path);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    (!escapes).then(|| data_dir.join(relative))
}

fn read_optional(path: &Path) -> TaskResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TaskError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn truncate_ts(timestamp: &str) -> String {
    timestamp.chars().take(TIMESTAMP_CHARS).collect()
}
