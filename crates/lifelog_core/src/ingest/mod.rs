//! Incremental ingestion of day-partitioned JSONL event logs.
//!
//! # Responsibility
//! - Read `<events_dir>/<day>.jsonl` strictly after each file's cursor.
//! - Normalize parseable lines into events and upsert them by id.
//! - Advance per-file cursors so repeated runs only read appended lines.
//!
//! # Invariants
//! - A missing day file is skipped, never an error.
//! - Blank and malformed lines are consumed (cursor advances) but produce no
//!   event; they are never retried.
//! - Events commit together with a cursor pointing at the last line read, in
//!   batches of at most `batch_size` events; a crash before a commit re-reads
//!   only that batch, and the id upsert keeps the store effect exactly-once.
//! - `last_line` never moves backwards.

use crate::model::artifact::IngestionCursor;
use crate::model::event::{is_day_label, Event};
use crate::repo::StoreError;
use crate::store::StateStore;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

const LOG_FILE_EXTENSION: &str = "jsonl";
const DEFAULT_BATCH_SIZE: usize = 500;

pub type IngestResult<T> = Result<T, IngestError>;

/// Fatal ingestion failure. Per-line problems never surface here.
#[derive(Debug)]
pub enum IngestError {
    Store(StoreError),
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Io { path, source } => {
                write!(f, "failed to read event log `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Reads event logs from one directory into a [`StateStore`].
pub struct Ingestor<'a> {
    store: &'a StateStore,
    events_dir: PathBuf,
    batch_size: usize,
}

/// Per-file outcome, used for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileIngestStats {
    pub lines_read: u64,
    pub events: usize,
    pub skipped_lines: u64,
    pub limit_reached: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a StateStore, events_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            events_dir: events_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Events buffered per file before a commit; at least 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Location of the log file for one day.
    pub fn day_file(&self, day: &str) -> PathBuf {
        self.events_dir
            .join(format!("{day}.{LOG_FILE_EXTENSION}"))
    }

    /// Ingests new lines for each day and returns the number of events
    /// upserted by this call.
    ///
    /// With `max_events`, stops as soon as that many events were ingested,
    /// committing the cursor at the current line so the next call resumes
    /// without gaps. `Some(0)` means no limit.
    pub fn ingest(&self, days: &[String], max_events: Option<usize>) -> IngestResult<usize> {
        let started_at = Instant::now();
        let limit = max_events.filter(|max| *max > 0);
        let mut ingested = 0usize;

        for day in days {
            let path = self.day_file(day);
            if !path.is_file() {
                debug!(
                    "event=ingest_file module=ingest status=skip reason=missing day={day}"
                );
                continue;
            }

            let remaining = limit.map(|max| max - ingested);
            let stats = self.ingest_file(&path, day, remaining)?;
            ingested += stats.events;

            if stats.limit_reached {
                info!(
                    "event=ingest module=ingest status=limit events={} limit={} duration_ms={}",
                    ingested,
                    limit.unwrap_or_default(),
                    started_at.elapsed().as_millis()
                );
                return Ok(ingested);
            }
        }

        info!(
            "event=ingest module=ingest status=ok days={} events={} duration_ms={}",
            days.len(),
            ingested,
            started_at.elapsed().as_millis()
        );
        Ok(ingested)
    }

    fn ingest_file(
        &self,
        path: &Path,
        day: &str,
        max_events: Option<usize>,
    ) -> IngestResult<FileIngestStats> {
        let io_err = |source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(io_err)?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());
        let cursor_key = cursor_key(path);
        let start_line = self
            .store
            .cursor(&cursor_key)?
            .map_or(0, |cursor| cursor.last_line);

        let file_day = Some(day).filter(|d| is_day_label(d));
        let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
        let mut stats = FileIngestStats::default();
        let mut events = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));
        let commit = |events: &[Event], last_line: u64| -> IngestResult<IngestionCursor> {
            let cursor = IngestionCursor {
                file_path: cursor_key.clone(),
                mtime,
                size: metadata.len(),
                last_line: last_line.max(start_line),
            };
            self.store.commit_ingested(events, &cursor)?;
            Ok(cursor)
        };
        let mut buf = Vec::new();
        let mut line_no = 0u64;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).map_err(io_err)?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if line_no <= start_line {
                continue;
            }
            stats.lines_read += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                stats.skipped_lines += 1;
                continue;
            };
            if line.trim().is_empty() {
                stats.skipped_lines += 1;
                continue;
            }

            match Event::from_log_line(line, file_day) {
                Ok(event) => events.push(event),
                Err(err) => {
                    stats.skipped_lines += 1;
                    debug!(
                        "event=ingest_line module=ingest status=skip file={} line={} reason={}",
                        path.display(),
                        line_no,
                        err
                    );
                    continue;
                }
            }

            if max_events.is_some_and(|max| stats.events + events.len() >= max) {
                stats.limit_reached = true;
                break;
            }
            if events.len() >= self.batch_size {
                commit(&events, line_no)?;
                stats.events += events.len();
                events.clear();
            }
        }

        let cursor = commit(&events, line_no)?;
        stats.events += events.len();

        if stats.skipped_lines > 0 {
            warn!(
                "event=ingest_file module=ingest status=partial file={} skipped_lines={}",
                path.display(),
                stats.skipped_lines
            );
        }
        info!(
            "event=ingest_file module=ingest status=ok file={} from_line={} to_line={} events={}",
            path.display(),
            start_line,
            cursor.last_line,
            stats.events
        );
        Ok(stats)
    }
}

/// Lists every `YYYY-MM-DD.jsonl` day label in `events_dir`, sorted.
pub fn discover_days(events_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut days = Vec::new();
    for entry in std::fs::read_dir(events_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_FILE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            if is_day_label(stem) {
                days.push(stem.to_string());
            }
        }
    }
    days.sort();
    Ok(days)
}

fn cursor_key(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
