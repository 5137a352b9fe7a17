use lifelog_core::vault::prompts::{
    CONCEPT_NOTE_SYSTEM, EXTRACT_CONCEPT_SYSTEM, GENERATE_QUESTIONS_SYSTEM, TASK_PLAN_SYSTEM,
};
use lifelog_core::{
    run_pipeline, run_with_generator, GenerationError, GenerationErrorKind, GenerationResult,
    Generator, PipelineError, PipelineOptions, PlanError, PlanIssue, ProcessorConfig,
    ProviderKind, RunOutcome, TaskStatus,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct ScriptedLlm {
    plan: Value,
    plan_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(plan: Value) -> Self {
        Self {
            plan,
            plan_failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_plan_first(plan: Value, failures: usize) -> Self {
        Self {
            plan_failures: AtomicUsize::new(failures),
            ..Self::new(plan)
        }
    }
}

impl Generator for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if system == TASK_PLAN_SYSTEM {
            let pending = self.plan_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.plan_failures.store(pending - 1, Ordering::SeqCst);
                return Err(GenerationError::from_status(503, "warming up"));
            }
            assert!(user.contains("[id:p1]"));
            self.plan.clone()
        } else if system == EXTRACT_CONCEPT_SYSTEM {
            json!({ "concept": "Borrow Checker" })
        } else if system == CONCEPT_NOTE_SYSTEM {
            json!({ "content": "# Borrow Checker\n" })
        } else if system == GENERATE_QUESTIONS_SYSTEM {
            json!({ "questions_markdown": "- What is a lifetime?\n" })
        } else {
            return Err(GenerationError::new(
                GenerationErrorKind::InvalidRequest,
                "unexpected prompt",
            ));
        };
        Ok(reply.to_string())
    }
}

fn default_plan() -> Value {
    json!({ "tasks": [
        {
            "task_id": "n1",
            "task_type": "CREATE_OR_UPDATE_NOTE",
            "description": "Note on borrowing",
            "related_event_ids": ["p1"],
            "dependencies": []
        },
        {
            "task_id": "q1",
            "task_type": "GENERATE_QUESTIONS",
            "description": "Generate questions for 'Borrow Checker'",
            "related_event_ids": [],
            "dependencies": ["n1"]
        },
        {
            "task_id": "orphan",
            "task_type": "GENERATE_QUESTIONS",
            "description": "Generate questions for 'Nothing'",
            "dependencies": ["never_planned"]
        }
    ]})
}

struct Workspace {
    _root: TempDir,
    config: ProcessorConfig,
}

fn workspace() -> Workspace {
    let root = tempfile::tempdir().unwrap();
    let data_dir = root.path().join("data");
    let events_dir = data_dir.join("events");
    std::fs::create_dir_all(&events_dir).unwrap();
    std::fs::create_dir_all(data_dir.join("text")).unwrap();
    std::fs::write(
        data_dir.join("text").join("p1.txt"),
        "The borrow checker enforces aliasing rules.",
    )
    .unwrap();
    std::fs::write(
        events_dir.join("2024-01-01.jsonl"),
        concat!(
            r#"{"id":"p1","ts":"2024-01-01T09:00:00Z","type":"browser.page_text","meta":{"url":"https://example.com/borrow","title":"Borrowing","text_path":"text/p1.txt","text_preview":"The borrow checker"}}"#,
            "\n",
            r#"{"id":"v1","ts":"2024-01-01T09:30:00Z","type":"browser.page_view","meta":{"url":"https://example.com"}}"#,
            "\n",
        ),
    )
    .unwrap();

    let mut config = ProcessorConfig {
        data_dir,
        vault_dir: root.path().join("vault"),
        ..ProcessorConfig::default()
    };
    config.llm.concurrency = 2;
    config.llm.retry_base_delay = Duration::from_millis(1);

    Workspace {
        _root: root,
        config,
    }
}

fn options(dry_run: bool) -> PipelineOptions {
    PipelineOptions {
        days: vec!["2024-01-01".to_string()],
        dry_run,
        ..PipelineOptions::default()
    }
}

fn vault_file(vault: &Path, folder: &str) -> std::path::PathBuf {
    vault.join(folder).join("borrow-checker.md")
}

#[test]
fn full_run_ingests_plans_and_writes_notes() {
    let ws = workspace();
    let llm = Arc::new(ScriptedLlm::new(default_plan()));

    let report = run_with_generator(&ws.config, &options(false), llm).unwrap();

    assert_eq!(report.ingested, 2);
    assert_eq!(report.events, 2);
    assert_eq!(report.planned_tasks, 3);
    let RunOutcome::Executed(run) = &report.outcome else {
        panic!("expected an executed run, got {:?}", report.outcome);
    };
    assert_eq!((run.completed, run.failed, run.blocked), (2, 0, 1));
    assert!(run.outcome("orphan").unwrap().blocked);
    assert_eq!(run.outcome("q1").unwrap().status, TaskStatus::Completed);

    let vault = &ws.config.vault_dir;
    assert_eq!(
        std::fs::read_to_string(vault_file(vault, "Concepts")).unwrap(),
        "# Borrow Checker\n"
    );
    assert!(vault_file(vault, "Questions").is_file());
    assert!(vault.join(".src").join("state.sqlite").is_file());
}

#[test]
fn second_run_reuses_ingested_events() {
    let ws = workspace();
    run_with_generator(
        &ws.config,
        &options(false),
        Arc::new(ScriptedLlm::new(default_plan())),
    )
    .unwrap();

    let report = run_with_generator(
        &ws.config,
        &options(false),
        Arc::new(ScriptedLlm::new(default_plan())),
    )
    .unwrap();

    assert_eq!(report.ingested, 0);
    assert_eq!(report.events, 2);
}

#[test]
fn dry_run_plans_without_writing() {
    let ws = workspace();
    let llm = Arc::new(ScriptedLlm::new(default_plan()));

    let report = run_with_generator(&ws.config, &options(true), llm.clone()).unwrap();

    let RunOutcome::DryRun(dry) = &report.outcome else {
        panic!("expected a dry run, got {:?}", report.outcome);
    };
    assert_eq!(dry.order(), vec!["n1", "q1"]);
    assert_eq!(dry.blocked, vec!["orphan".to_string()]);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert!(!ws.config.vault_dir.join("Concepts").exists());
}

#[test]
fn rebuild_only_on_empty_store_skips_everything() {
    let ws = workspace();
    let llm = Arc::new(ScriptedLlm::new(default_plan()));
    let opts = PipelineOptions {
        rebuild_only: true,
        ..options(false)
    };

    let report = run_with_generator(&ws.config, &opts, llm.clone()).unwrap();

    assert_eq!(report.ingested, 0);
    assert!(matches!(report.outcome, RunOutcome::Skipped(_)));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn transient_planner_failures_are_retried() {
    let ws = workspace();
    let llm = Arc::new(ScriptedLlm::failing_plan_first(default_plan(), 2));

    let report = run_with_generator(&ws.config, &options(true), llm.clone()).unwrap();

    assert_eq!(report.planned_tasks, 3);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn duplicate_task_ids_are_rejected() {
    let ws = workspace();
    let plan = json!({ "tasks": [
        { "task_id": "n1", "task_type": "CREATE_OR_UPDATE_NOTE", "description": "a" },
        { "task_id": "n1", "task_type": "CREATE_OR_UPDATE_NOTE", "description": "b" }
    ]});

    let err = run_with_generator(&ws.config, &options(false), Arc::new(ScriptedLlm::new(plan)))
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Plan(PlanError::Invalid(PlanIssue::DuplicateTaskId(ref id))) if id == "n1"
    ));
}

#[test]
fn empty_plan_is_skipped() {
    let ws = workspace();
    let llm = Arc::new(ScriptedLlm::new(json!({ "tasks": [] })));

    let report = run_with_generator(&ws.config, &options(false), llm).unwrap();

    assert_eq!(report.planned_tasks, 0);
    assert!(matches!(report.outcome, RunOutcome::Skipped(_)));
}

#[test]
fn provider_without_credentials_fails_after_ingestion() {
    let ws = workspace();
    let opts = PipelineOptions {
        provider: Some(ProviderKind::OpenAi),
        ..options(false)
    };

    let err = run_pipeline(&ws.config, &opts).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Provider(ref source) if source.kind == GenerationErrorKind::Config
    ));
}
