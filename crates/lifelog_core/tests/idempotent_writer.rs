use lifelog_core::writer::WriteAction;
use lifelog_core::{content_sha, IdempotentWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[test]
fn identical_second_write_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Concepts").join("rust.md");
    let writer = IdempotentWriter::new();

    let first = writer.write_with_outcome(&path, "# Rust\n", None).unwrap();
    assert_eq!(first.action, WriteAction::Written);
    let mtime_before = std::fs::metadata(&path).unwrap().modified().unwrap();

    std::thread::sleep(Duration::from_millis(20));
    let second = writer.write_with_outcome(&path, "# Rust\n", None).unwrap();

    assert_eq!(second.action, WriteAction::Unchanged);
    assert_eq!(second.sha, first.sha);
    assert_eq!(first.sha, content_sha("# Rust\n"));
    let mtime_after = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after);
}

#[test]
fn changed_content_replaces_file_and_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.md");
    let writer = IdempotentWriter::new();

    let old_sha = writer.write(&path, "old", None).unwrap();
    let new_sha = writer.write(&path, "new", Some(&old_sha)).unwrap();

    assert_ne!(old_sha, new_sha);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn concurrent_reader_never_sees_partial_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contended.md");
    let small = "a".repeat(4 * 1024);
    let large = "b".repeat(256 * 1024);
    let writer = IdempotentWriter::new();
    writer.write(&path, &small, None).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..40 {
                let content = if round % 2 == 0 { &large } else { &small };
                writer.write(&path, content, None).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let observed = std::fs::read_to_string(&path).unwrap();
                assert!(
                    observed == small || observed == large,
                    "observed partial content of {} bytes",
                    observed.len()
                );
            }
        });
    });
}
