//! Artifact, concept and page bookkeeping.
//!
//! # Responsibility
//! - Record the content hash of every materialized file so unchanged
//!   renderings can skip disk I/O.
//! - Track concept titles for cross-linking between notes.
//!
//! # Invariants
//! - `updated_ts` / `last_seen_ts` are UTC ISO-8601 strings.

use crate::model::artifact::Artifact;
use crate::repo::StoreResult;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for artifact and concept records.
pub trait ArtifactRepository {
    fn get_artifact(&self, key: &str) -> StoreResult<Option<Artifact>>;
    fn artifact_sha(&self, key: &str) -> StoreResult<Option<String>>;
    fn set_artifact(&self, artifact: &Artifact) -> StoreResult<()>;
    fn upsert_concept(
        &self,
        concept_name: &str,
        title: &str,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()>;
    fn concept_titles(&self) -> StoreResult<Vec<String>>;
    fn upsert_page(
        &self,
        url: &str,
        title: Option<&str>,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()>;
}

/// SQLite-backed artifact repository.
pub struct SqliteArtifactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteArtifactRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ArtifactRepository for SqliteArtifactRepository<'_> {
    fn get_artifact(&self, key: &str) -> StoreResult<Option<Artifact>> {
        let artifact = self
            .conn
            .query_row(
                "SELECT key, kind, target_path, content_sha, updated_ts
                 FROM artifacts WHERE key = ?1;",
                [key],
                parse_artifact_row,
            )
            .optional()?;
        Ok(artifact)
    }

    fn artifact_sha(&self, key: &str) -> StoreResult<Option<String>> {
        let sha = self
            .conn
            .query_row(
                "SELECT content_sha FROM artifacts WHERE key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sha)
    }

    fn set_artifact(&self, artifact: &Artifact) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO artifacts (key, kind, target_path, content_sha, updated_ts)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));",
            params![
                artifact.key.as_str(),
                artifact.kind.as_str(),
                artifact.target_path.as_str(),
                artifact.content_sha.as_str(),
            ],
        )?;
        Ok(())
    }

    fn upsert_concept(
        &self,
        concept_name: &str,
        title: &str,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO concepts (concept_name, title, last_seen_ts, content_sha)
             VALUES (?1, ?2, ?3, ?4);",
            params![concept_name, title, last_seen_ts, content_sha],
        )?;
        Ok(())
    }

    fn concept_titles(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT title FROM concepts ORDER BY title ASC;")?;
        let titles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(titles)
    }

    fn upsert_page(
        &self,
        url: &str,
        title: Option<&str>,
        content_sha: &str,
        last_seen_ts: &str,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pages (url, canonical_url, title, last_seen_ts, content_sha)
             VALUES (?1, ?1, ?2, ?3, ?4);",
            params![url, title.unwrap_or(""), last_seen_ts, content_sha],
        )?;
        Ok(())
    }
}

fn parse_artifact_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        key: row.get(0)?,
        kind: row.get(1)?,
        target_path: row.get(2)?,
        content_sha: row.get(3)?,
        updated_ts: row.get(4)?,
    })
}
