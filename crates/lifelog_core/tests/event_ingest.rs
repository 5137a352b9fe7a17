use lifelog_core::{discover_days, Ingestor, StateStore};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

fn write_day(events_dir: &Path, day: &str, lines: &[&str]) {
    std::fs::create_dir_all(events_dir).unwrap();
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(events_dir.join(format!("{day}.jsonl")), body).unwrap();
}

fn append_day(events_dir: &Path, day: &str, lines: &[&str]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(events_dir.join(format!("{day}.jsonl")))
        .unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn cursor_line(store: &StateStore, events_dir: &Path, day: &str) -> u64 {
    let path = std::fs::canonicalize(events_dir.join(format!("{day}.jsonl"))).unwrap();
    store
        .cursor(&path.to_string_lossy())
        .unwrap()
        .map_or(0, |cursor| cursor.last_line)
}

fn days(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|label| label.to_string()).collect()
}

#[test]
fn malformed_lines_are_consumed_without_events() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"e1","ts":"2024-01-01T08:00:00Z","type":"browser.page_view"}"#,
            "not json at all",
            "",
            r#"{"id":"e2","ts":"2024-01-01T09:00:00Z","type":"browser.page_view"}"#,
            r#"[1, 2, 3]"#,
            r#"{"ts":"2024-01-01T10:00:00Z","type":"audio.segment"}"#,
        ],
    );
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join("2024-01-01.jsonl"))
        .unwrap();
    file.write_all(b"\xff\xfe\n").unwrap();
    drop(file);
    append_day(
        dir.path(),
        "2024-01-01",
        &[r#"{"id":"e3","ts":"2024-01-01T11:00:00Z","type":"browser.page_view"}"#],
    );

    let ingestor = Ingestor::new(&store, dir.path());
    let ingested = ingestor.ingest(&days(&["2024-01-01"]), None).unwrap();

    assert_eq!(ingested, 4);
    assert_eq!(store.count_events().unwrap(), 4);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 8);
    assert_eq!(ingestor.ingest(&days(&["2024-01-01"]), None).unwrap(), 0);
}

#[test]
fn small_batches_commit_every_event_and_respect_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"e1","ts":"2024-01-01T01:00:00Z","type":"t"}"#,
            r#"{"id":"e2","ts":"2024-01-01T02:00:00Z","type":"t"}"#,
            "garbage",
            r#"{"id":"e3","ts":"2024-01-01T03:00:00Z","type":"t"}"#,
            r#"{"id":"e4","ts":"2024-01-01T04:00:00Z","type":"t"}"#,
            r#"{"id":"e5","ts":"2024-01-01T05:00:00Z","type":"t"}"#,
        ],
    );
    let ingestor = Ingestor::new(&store, dir.path()).with_batch_size(2);
    let day = days(&["2024-01-01"]);

    assert_eq!(ingestor.ingest(&day, Some(3)).unwrap(), 3);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 4);
    assert_eq!(store.count_events().unwrap(), 3);

    assert_eq!(ingestor.ingest(&day, None).unwrap(), 2);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 6);
    assert_eq!(store.count_events().unwrap(), 5);
}

#[test]
fn reingesting_unchanged_file_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"e1","ts":"2024-01-01T08:00:00Z","type":"t"}"#,
            r#"{"id":"e2","ts":"2024-01-01T09:00:00Z","type":"t"}"#,
        ],
    );
    let ingestor = Ingestor::new(&store, dir.path());

    assert_eq!(ingestor.ingest(&days(&["2024-01-01"]), None).unwrap(), 2);
    assert_eq!(ingestor.ingest(&days(&["2024-01-01"]), None).unwrap(), 0);
    assert_eq!(store.count_events().unwrap(), 2);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 2);
}

#[test]
fn appended_lines_are_ingested_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[r#"{"id":"e1","ts":"2024-01-01T08:00:00Z","type":"t"}"#],
    );
    let ingestor = Ingestor::new(&store, dir.path());
    assert_eq!(ingestor.ingest(&days(&["2024-01-01"]), None).unwrap(), 1);

    append_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"e2","ts":"2024-01-01T09:00:00Z","type":"t"}"#,
            r#"{"id":"e3","ts":"2024-01-01T10:00:00Z","type":"t"}"#,
        ],
    );

    assert_eq!(ingestor.ingest(&days(&["2024-01-01"]), None).unwrap(), 2);
    let ids: Vec<String> = store
        .events_for_day("2024-01-01")
        .unwrap()
        .into_iter()
        .map(|event| event.id)
        .collect();
    assert_eq!(ids, vec!["e1", "e2", "e3"]);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 3);
}

#[test]
fn max_events_stops_mid_file_and_resumes_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"e1","ts":"2024-01-01T01:00:00Z","type":"t"}"#,
            "garbage",
            r#"{"id":"e2","ts":"2024-01-01T02:00:00Z","type":"t"}"#,
            r#"{"id":"e3","ts":"2024-01-01T03:00:00Z","type":"t"}"#,
            r#"{"id":"e4","ts":"2024-01-01T04:00:00Z","type":"t"}"#,
        ],
    );
    write_day(
        dir.path(),
        "2024-01-02",
        &[r#"{"id":"f1","ts":"2024-01-02T01:00:00Z","type":"t"}"#],
    );
    let ingestor = Ingestor::new(&store, dir.path());
    let both = days(&["2024-01-01", "2024-01-02"]);

    assert_eq!(ingestor.ingest(&both, Some(2)).unwrap(), 2);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-01"), 3);
    assert_eq!(cursor_line(&store, dir.path(), "2024-01-02"), 0);

    assert_eq!(ingestor.ingest(&both, Some(2)).unwrap(), 2);
    assert_eq!(ingestor.ingest(&both, Some(2)).unwrap(), 1);
    assert_eq!(ingestor.ingest(&both, Some(2)).unwrap(), 0);
    assert_eq!(store.count_events().unwrap(), 5);
}

#[test]
fn missing_day_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-02",
        &[r#"{"id":"e1","ts":"2024-01-02T08:00:00Z","type":"t"}"#],
    );

    let ingested = Ingestor::new(&store, dir.path())
        .ingest(&days(&["2024-01-01", "2024-01-02"]), None)
        .unwrap();
    assert_eq!(ingested, 1);
}

#[test]
fn events_without_ids_get_stable_hash_ids_and_file_day() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    let line = r#"{"type":"browser.page_text","meta":{"url":"https://example.com/a"}}"#;
    write_day(dir.path(), "2024-03-05", &[line]);

    Ingestor::new(&store, dir.path())
        .ingest(&days(&["2024-03-05"]), None)
        .unwrap();

    let events = store.events_for_day("2024-03-05").unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.id.len(), 64);
    assert_eq!(event.source, "unknown");
    assert_eq!(event.url.as_deref(), Some("https://example.com/a"));

    let by_url = store.events_for_url("https://example.com/a").unwrap();
    assert_eq!(by_url.len(), 1);
    let ids: BTreeSet<String> = [event.id.clone()].into_iter().collect();
    assert_eq!(store.events_by_ids(&ids).unwrap(), events);
}

#[test]
fn two_day_scenario_returns_events_ordered_by_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    write_day(
        dir.path(),
        "2024-01-01",
        &[
            r#"{"id":"c","ts":"2024-01-01T15:00:00Z","type":"browser.page_view"}"#,
            r#"{"id":"a","ts":"2024-01-01T09:00:00Z","type":"browser.page_text"}"#,
            r#"{"id":"b","ts":"2024-01-01T12:00:00Z","type":"browser.page_view"}"#,
        ],
    );
    write_day(
        dir.path(),
        "2024-01-02",
        &[
            r#"{"id":"d","ts":"2024-01-02T09:00:00Z","type":"browser.page_view"}"#,
            r#"{"id":"e","ts":"2024-01-02T10:00:00Z","type":"audio.segment"}"#,
        ],
    );

    let ingested = Ingestor::new(&store, dir.path())
        .ingest(&days(&["2024-01-01", "2024-01-02"]), None)
        .unwrap();
    assert_eq!(ingested, 5);

    let first_day: Vec<String> = store
        .events_for_day("2024-01-01")
        .unwrap()
        .into_iter()
        .map(|event| event.id)
        .collect();
    assert_eq!(first_day, vec!["a", "b", "c"]);

    let page_views = store
        .events_by_type("browser.page_view", Some("2024-01-01"))
        .unwrap();
    assert_eq!(page_views.len(), 2);
    assert_eq!(store.events_by_type("audio.segment", None).unwrap().len(), 1);
}

#[test]
fn discover_days_lists_sorted_day_files_only() {
    let dir = tempfile::tempdir().unwrap();
    write_day(dir.path(), "2024-01-02", &["{}"]);
    write_day(dir.path(), "2024-01-01", &["{}"]);
    std::fs::write(dir.path().join("notes.jsonl"), "{}\n").unwrap();
    std::fs::write(dir.path().join("2024-01-03.txt"), "{}\n").unwrap();

    assert_eq!(
        discover_days(dir.path()).unwrap(),
        vec!["2024-01-01".to_string(), "2024-01-02".to_string()]
    );
}
