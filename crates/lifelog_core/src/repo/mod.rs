//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for events, ingestion
//!   cursors and artifacts.
//! - Isolate SQLite query details from ingestion and task execution.
//!
//! # Invariants
//! - Events and cursors are written with insert-or-replace keyed by id/path.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod artifact_repo;
pub mod cursor_repo;
pub mod event_repo;

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable-store failure. Fatal to ingestion; fatal to a single task when
/// raised inside a task handler.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidData(String),
    NotFound(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::NotFound(key) => write!(f, "record not found: {key}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
