use lifelog_core::vault::prompts::{
    CONCEPT_NOTE_SYSTEM, EXTRACT_CONCEPT_SYSTEM, GENERATE_QUESTIONS_SYSTEM,
};
use lifelog_core::{
    Event, GenerationError, GenerationErrorKind, GenerationResult, Generator, IdempotentWriter,
    NoteWorker, StateStore, Task, TaskError, TaskHandler, TaskType, WorkerContext,
};
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct FakeGenerator {
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeGenerator {
    fn calls_for(&self, system: &str) -> Vec<String> {
        self.prompts
            .lock()
            .iter()
            .filter(|(sent, _)| sent == system)
            .map(|(_, user)| user.clone())
            .collect()
    }
}

impl Generator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        self.prompts
            .lock()
            .push((system.to_string(), user.to_string()));
        let reply = if system == EXTRACT_CONCEPT_SYSTEM {
            json!({ "concept": "\"Rust Ownership\"" })
        } else if system == CONCEPT_NOTE_SYSTEM {
            json!({ "content": "# Rust Ownership\n\n- Each value has one owner.\n" })
        } else if system == GENERATE_QUESTIONS_SYSTEM {
            json!({ "questions_markdown": "- When does a move happen?\n- Why borrow?\n" })
        } else {
            return Err(GenerationError::new(
                GenerationErrorKind::InvalidRequest,
                "unexpected prompt",
            ));
        };
        Ok(reply.to_string())
    }
}

struct Fixture {
    _root: TempDir,
    vault: std::path::PathBuf,
    store: Arc<StateStore>,
    generator: Arc<FakeGenerator>,
    worker: NoteWorker,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    let vault = root.path().join("vault");
    std::fs::create_dir_all(data.join("text")).unwrap();
    std::fs::write(
        data.join("text").join("p1.txt"),
        "Ownership moves values between bindings.",
    )
    .unwrap();

    let store = Arc::new(StateStore::open_in_memory().unwrap());
    for line in [
        r#"{"id":"p1","ts":"2024-01-01T09:00:00Z","type":"browser.page_text","meta":{"url":"https://doc.rust-lang.org/book/ch04","title":"Ownership","text_path":"text/p1.txt"}}"#,
        r#"{"id":"p2","ts":"2024-01-01T09:05:00Z","type":"browser.page_text","meta":{"url":"https://example.com/gone","title":"Gone","text_path":"text/missing.txt"}}"#,
        r#"{"id":"v1","ts":"2024-01-01T09:10:00Z","type":"browser.page_view","meta":{"url":"https://example.com"}}"#,
    ] {
        store
            .upsert_event(&Event::from_log_line(line, None).unwrap())
            .unwrap();
    }

    let generator = Arc::new(FakeGenerator::default());
    let ctx = Arc::new(WorkerContext {
        store: Arc::clone(&store),
        generator: generator.clone(),
        writer: IdempotentWriter::new(),
        vault_dir: vault.clone(),
        data_dir: data,
    });

    Fixture {
        _root: root,
        vault,
        store,
        generator,
        worker: NoteWorker::new(ctx),
    }
}

fn note_task(events: &[&str]) -> Task {
    Task::new("n1", TaskType::CreateOrUpdateNote, "Note about ownership")
        .with_events(events.iter().copied())
}

fn questions_task() -> Task {
    Task::new(
        "q1",
        TaskType::GenerateQuestions,
        "Generate questions for 'Rust Ownership'",
    )
    .depends_on(["n1"])
}

fn concept_path(vault: &Path) -> std::path::PathBuf {
    vault.join("Concepts").join("rust-ownership.md")
}

#[test]
fn note_task_writes_concept_note_and_records_artifact() {
    let mut fx = fixture();

    let result = fx.worker.execute(&note_task(&["p1", "p2", "v1"])).unwrap();

    assert_eq!(result.as_deref(), Some("concept:Rust Ownership"));
    let written = std::fs::read_to_string(concept_path(&fx.vault)).unwrap();
    assert!(written.starts_with("# Rust Ownership"));

    let artifact = fx
        .store
        .get_artifact("concept:Rust Ownership")
        .unwrap()
        .unwrap();
    assert_eq!(artifact.kind, "concept");
    assert_eq!(artifact.content_sha, lifelog_core::content_sha(&written));
    assert!(!artifact.updated_ts.is_empty());
    assert_eq!(fx.store.concept_titles().unwrap(), vec!["Rust Ownership"]);

    let extract_prompts = fx.generator.calls_for(EXTRACT_CONCEPT_SYSTEM);
    assert_eq!(extract_prompts.len(), 1);
    assert!(extract_prompts[0].contains("Ownership moves values"));
    assert!(extract_prompts[0].contains("URL: https://doc.rust-lang.org/book/ch04"));
}

#[test]
fn rerunning_note_task_merges_and_keeps_file_untouched() {
    let mut fx = fixture();
    let task = note_task(&["p1"]);
    fx.worker.execute(&task).unwrap();
    let path = concept_path(&fx.vault);
    let mtime_before = std::fs::metadata(&path).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    fx.worker.execute(&task).unwrap();

    let note_prompts = fx.generator.calls_for(CONCEPT_NOTE_SYSTEM);
    assert_eq!(note_prompts.len(), 2);
    assert!(!note_prompts[0].contains("EXISTING NOTE"));
    assert!(note_prompts[1].contains("EXISTING NOTE"));
    assert!(note_prompts[1].contains("- Rust Ownership"));
    let mtime_after = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after);
}

#[test]
fn questions_task_writes_question_note() {
    let mut fx = fixture();
    fx.worker.execute(&note_task(&["p1"])).unwrap();

    let result = fx.worker.execute(&questions_task()).unwrap();

    assert_eq!(result.as_deref(), Some("question:Rust Ownership"));
    let path = fx.vault.join("Questions").join("rust-ownership.md");
    assert!(std::fs::read_to_string(path)
        .unwrap()
        .contains("When does a move happen?"));
    assert_eq!(
        fx.store
            .get_artifact("question:Rust Ownership")
            .unwrap()
            .unwrap()
            .kind,
        "question"
    );
    let prompts = fx.generator.calls_for(GENERATE_QUESTIONS_SYSTEM);
    assert!(prompts[0].contains("Each value has one owner."));
}

#[test]
fn questions_without_concept_note_fail() {
    let mut fx = fixture();

    let err = fx.worker.execute(&questions_task()).unwrap_err();

    assert!(matches!(err, TaskError::MissingInput(_)));
    assert!(fx.generator.prompts.lock().is_empty());
}

#[test]
fn note_task_without_text_is_skipped() {
    let mut fx = fixture();

    let no_events = fx.worker.execute(&note_task(&["unknown"])).unwrap();
    let no_text = fx.worker.execute(&note_task(&["v1", "p2"])).unwrap();

    assert_eq!(no_events.as_deref(), Some("skipped: no events"));
    assert_eq!(no_text.as_deref(), Some("skipped: no text"));
    assert!(fx.generator.prompts.lock().is_empty());
    assert!(!fx.vault.join("Concepts").exists());
}

#[test]
fn unknown_task_type_is_rejected() {
    let mut fx = fixture();
    let task = Task::new("x", TaskType::from("SUMMARIZE_DAY".to_string()), "summary");

    let err = fx.worker.execute(&task).unwrap_err();

    assert!(matches!(err, TaskError::UnsupportedTaskType(ref kind) if kind == "SUMMARIZE_DAY"));
}
