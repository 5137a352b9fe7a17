//! Task and plan model.
//!
//! # Responsibility
//! - Define the typed unit of work produced by the planner.
//! - Provide structural checks over a plan's dependency graph.
//!
//! # Invariants
//! - `task_id` is unique within a [`Plan`].
//! - `status` is mutated only by the executor.
//! - Tasks are never removed from a plan during a run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};

/// Kind of work a task performs. Unknown kinds are preserved verbatim so a
/// plan can round-trip; the executor fails them at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    CreateOrUpdateNote,
    GenerateQuestions,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateOrUpdateNote => "CREATE_OR_UPDATE_NOTE",
            Self::GenerateQuestions => "GENERATE_QUESTIONS",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        match value.trim() {
            "CREATE_OR_UPDATE_NOTE" => Self::CreateOrUpdateNote,
            "GENERATE_QUESTIONS" => Self::GenerateQuestions,
            _ => Self::Other(value),
        }
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle state.
///
/// `Pending -> Running -> Completed | Failed`. A task whose dependencies
/// never complete stays `Pending` and is reported as blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub description: String,
    /// Read-only back-references into the event store.
    #[serde(default)]
    pub related_event_ids: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<String>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        task_type: TaskType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            description: description.into(),
            related_event_ids: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    pub fn depends_on<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(task_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_events<I, S>(mut self, event_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_event_ids
            .extend(event_ids.into_iter().map(Into::into));
        self
    }
}

/// Structural problem found in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    DuplicateTaskId(String),
    UnknownDependency { task_id: String, dependency: String },
    /// Tasks that sit on, or downstream of, a dependency cycle.
    Cycle(Vec<String>),
}

impl Display for PlanIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTaskId(id) => write!(f, "duplicate task id `{id}`"),
            Self::UnknownDependency {
                task_id,
                dependency,
            } => write!(f, "task `{task_id}` depends on unknown task `{dependency}`"),
            Self::Cycle(ids) => write!(f, "dependency cycle among tasks [{}]", ids.join(", ")),
        }
    }
}

impl std::error::Error for PlanIssue {}

/// Ordered collection of tasks for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == status)
            .count()
    }

    /// Reports duplicate ids, dangling dependencies and cycles.
    ///
    /// Cycle detection is Kahn's algorithm over known edges: whatever cannot
    /// be peeled off is on a cycle or depends on one.
    pub fn issues(&self) -> Vec<PlanIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.task_id.as_str()) {
                issues.push(PlanIssue::DuplicateTaskId(task.task_id.clone()));
            }
        }

        for task in &self.tasks {
            for dependency in &task.dependencies {
                if !seen.contains(dependency.as_str()) {
                    issues.push(PlanIssue::UnknownDependency {
                        task_id: task.task_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            let known = task
                .dependencies
                .iter()
                .filter(|dep| seen.contains(dep.as_str()))
                .count();
            in_degree.insert(task.task_id.as_str(), known);
            for dependency in &task.dependencies {
                if seen.contains(dependency.as_str()) {
                    dependents
                        .entry(dependency.as_str())
                        .or_default()
                        .push(task.task_id.as_str());
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        while let Some(id) = queue.pop_front() {
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        if !stuck.is_empty() {
            stuck.sort();
            issues.push(PlanIssue::Cycle(stuck));
        }

        issues
    }
}
