//! Thread-safe facade over the pipeline state database.
//!
//! # Responsibility
//! - Own the single SQLite connection for one output root.
//! - Expose one short-lived lock (and transaction where needed) per logical
//!   read or write, so no transaction ever spans a generation call.
//!
//! # Invariants
//! - A file's events and its cursor commit in the same transaction.
//! - The database lives at `<vault>/.src/state.sqlite` and can be deleted
//!   and rebuilt from the source logs.

use crate::db::{open_db, open_db_in_memory};
use crate::model::artifact::{Artifact, IngestionCursor};
use crate::model::event::Event;
use crate::repo::artifact_repo::{ArtifactRepository, SqliteArtifactRepository};
use crate::repo::cursor_repo::{CursorRepository, SqliteCursorRepository};
use crate::repo::event_repo::{EventRepository, SqliteEventRepository};
use crate::repo::StoreResult;
use log::debug;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const STATE_DIR_NAME: &str = ".src";
const STATE_DB_FILE: &str = "state.sqlite";

/// Returns the state database location for a vault root.
pub fn state_db_path(vault_dir: &Path) -> PathBuf {
    vault_dir.join(STATE_DIR_NAME).join(STATE_DB_FILE)
}

/// Shared handle to events, cursors and artifact records.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Opens (creating and migrating as needed) a file-backed store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_db(path)?),
        })
    }

    /// Opens the store belonging to a vault root.
    pub fn open_for_vault(vault_dir: &Path) -> StoreResult<Self> {
        Self::open(state_db_path(vault_dir))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_in_memory()?),
        })
    }

    pub fn cursor(&self, file_path: &str) -> StoreResult<Option<IngestionCursor>> {
        let conn = self.conn.lock();
        SqliteCursorRepository::new(&conn).get_cursor(file_path)
    }

    /// Upserts a batch of events and advances the file cursor atomically.
    pub fn commit_ingested(&self, events: &[Event], cursor: &IngestionCursor) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let events_repo = SqliteEventRepository::new(&tx);
            for event in events {
                events_repo.upsert_event(event)?;
            }
            SqliteCursorRepository::new(&tx).save_cursor(cursor)?;
        }
        tx.commit()?;
        debug!(
            "event=ingest_commit module=store status=ok events={} last_line={}",
            events.len(),
            cursor.last_line
        );
        Ok(())
    }

    pub fn upsert_event(&self, event: &Event) -> StoreResult<()> {
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).upsert_event(event)
    }

    pub fn events_for_day(&self, day: &str) -> StoreResult<Vec<Event>> {
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).events_for_day(day)
    }

    pub fn events_by_ids(&self, ids: &BTreeSet<String>) -> StoreResult<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).events_by_ids(&ids)
    }

    pub fn events_by_type(&self, kind: &str, day: Option<&str>) -> StoreResult<Vec<Event>> {
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).events_by_type(kind, day)
    }

    pub fn events_for_url(&self, url: &str) -> StoreResult<Vec<Event>> {
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).events_for_url(url)
    }

    pub fn count_events(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        SqliteEventRepository::new(&conn).count_events()
    }

    pub fn get_artifact(&self, key: &str) -> StoreResult<Option<Artifact>> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).get_artifact(key)
    }

    pub fn artifact_sha(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).artifact_sha(key)
    }

    pub fn set_artifact(&self, artifact: &Artifact) -> StoreResult<()> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).set_artifact(artifact)
    }

    pub fn upsert_concept(
        &self,
        concept_name: &str,
        title: &str,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).upsert_concept(
            concept_name,
            title,
            content_sha,
            last_seen_ts,
        )
    }

    pub fn concept_titles(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).concept_titles()
    }

    pub fn upsert_page(
        &self,
        url: &str,
        title: Option<&str>,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        SqliteArtifactRepository::new(&conn).upsert_page(url, title, content_sha, last_seen_ts)
    }
}
