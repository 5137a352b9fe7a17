//! Content-addressed, atomic file materialization.
//!
//! # Responsibility
//! - Skip writes whose content hash matches what is already known or on disk.
//! - Replace files atomically via a temporary sibling and rename.
//!
//! # Invariants
//! - After a successful return the target hashes to the returned digest.
//! - Readers observe either the old or the new complete content, never a
//!   partial write.
//! - Concurrent writers with different content are last-writer-wins.

use log::{debug, info};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub type WriteResult<T> = Result<T, WriteError>;

/// Filesystem failure while materializing one file.
#[derive(Debug)]
pub struct WriteError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl WriteError {
    fn new(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to write `{}`: {}", self.path.display(), self.source)
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Hex SHA-256 of UTF-8 content.
pub fn content_sha(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// What a write call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Caller-supplied hash matched; no filesystem access.
    KnownHash,
    /// File on disk already held the content.
    Unchanged,
    Written,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub sha: String,
    pub action: WriteAction,
}

/// Idempotent writer. With `overwrite` set, both hash gates are bypassed
/// and every call rewrites the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotentWriter {
    overwrite: bool,
}

impl IdempotentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overwrite(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Writes `content` to `path` unless it is already there; returns the
    /// content hash.
    pub fn write(
        &self,
        path: &Path,
        content: &str,
        known_prior_hash: Option<&str>,
    ) -> WriteResult<String> {
        self.write_with_outcome(path, content, known_prior_hash)
            .map(|outcome| outcome.sha)
    }

    pub fn write_with_outcome(
        &self,
        path: &Path,
        content: &str,
        known_prior_hash: Option<&str>,
    ) -> WriteResult<WriteOutcome> {
        let sha = content_sha(content);

        if !self.overwrite {
            if known_prior_hash == Some(sha.as_str()) {
                debug!(
                    "event=write module=writer status=skip reason=known_hash path={}",
                    path.display()
                );
                return Ok(WriteOutcome {
                    sha,
                    action: WriteAction::KnownHash,
                });
            }

            match std::fs::read(path) {
                Ok(existing) if hex::encode(Sha256::digest(&existing)) == sha => {
                    debug!(
                        "event=write module=writer status=skip reason=unchanged path={}",
                        path.display()
                    );
                    return Ok(WriteOutcome {
                        sha,
                        action: WriteAction::Unchanged,
                    });
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(WriteError::new(path, err)),
            }
        }

        replace_atomically(path, content.as_bytes())?;
        info!(
            "event=write module=writer status=ok path={} bytes={}",
            path.display(),
            content.len()
        );
        Ok(WriteOutcome {
            sha,
            action: WriteAction::Written,
        })
    }
}

fn replace_atomically(path: &Path, bytes: &[u8]) -> WriteResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|err| WriteError::new(path, err))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| WriteError::new(path, err))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| WriteError::new(path, err))?;
    tmp.persist(path)
        .map_err(|err| WriteError::new(path, err.error))?;
    Ok(())
}
