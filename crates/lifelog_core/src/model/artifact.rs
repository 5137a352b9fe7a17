//! Persisted bookkeeping records: ingestion cursors and written artifacts.

use serde::{Deserialize, Serialize};

/// Read position of one append-only source file.
///
/// `last_line` never decreases across runs for a given file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionCursor {
    pub file_path: String,
    /// Modification time in fractional unix seconds.
    pub mtime: f64,
    pub size: u64,
    pub last_line: u64,
}

impl IngestionCursor {
    /// Cursor for a file that has never been read.
    pub fn unread(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            mtime: 0.0,
            size: 0,
            last_line: 0,
        }
    }
}

/// Last known rendering of a generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical key such as `concept:<name>` or `question:<name>`.
    pub key: String,
    pub kind: String,
    pub target_path: String,
    pub content_sha: String,
    /// Set by the store on upsert.
    pub updated_ts: String,
}

impl Artifact {
    pub fn new(
        key: impl Into<String>,
        kind: impl Into<String>,
        target_path: impl Into<String>,
        content_sha: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            target_path: target_path.into(),
            content_sha: content_sha.into(),
            updated_ts: String::new(),
        }
    }
}
