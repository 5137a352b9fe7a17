//! Captured activity event model.
//!
//! # Responsibility
//! - Define the normalized event record stored by the ingestor.
//! - Normalize one raw log line into an [`Event`].
//!
//! # Invariants
//! - `id` is stable for identical input: the producer's `id` when present and
//!   non-blank, otherwise the SHA-256 of the trimmed raw line.
//! - `day` is `YYYY-MM-DD` taken from `ts`, else from the file's day label,
//!   else empty.
//! - Events are immutable after insertion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fallback for missing `type`/`source` fields.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Event type emitted by the browser extension when page text is captured.
pub const PAGE_TEXT_EVENT: &str = "browser.page_text";

/// Event type emitted for a transcribed audio segment.
pub const AUDIO_SEGMENT_EVENT: &str = "audio.segment";

/// Normalized activity event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// ISO-8601 timestamp as written by the producer; empty when absent.
    pub timestamp: String,
    pub day: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub url: Option<String>,
    /// Original record, kept verbatim.
    pub payload: Value,
}

/// Raw line that is not a structured record.
#[derive(Debug)]
pub enum EventParseError {
    Json(serde_json::Error),
    NotAnObject,
}

impl Display for EventParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "line is not valid JSON: {err}"),
            Self::NotAnObject => write!(f, "line is not a JSON object"),
        }
    }
}

impl Error for EventParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::NotAnObject => None,
        }
    }
}

impl Event {
    /// Normalizes one log line. `file_day` is the day label of the source
    /// file and is used when the record carries no timestamp.
    pub fn from_log_line(line: &str, file_day: Option<&str>) -> Result<Self, EventParseError> {
        let line = line.trim();
        let payload: Value = serde_json::from_str(line).map_err(EventParseError::Json)?;
        let Value::Object(record) = &payload else {
            return Err(EventParseError::NotAnObject);
        };

        let id = non_blank(record, "id").unwrap_or_else(|| sha256_hex(line));
        let timestamp = non_blank(record, "ts").unwrap_or_default();
        let day = event_day(&timestamp, file_day).unwrap_or_default();
        let kind = non_blank(record, "type").unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let source = non_blank(record, "source").unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let url = record
            .get("meta")
            .and_then(Value::as_object)
            .and_then(|meta| non_blank(meta, "url"));

        Ok(Self {
            id,
            timestamp,
            day,
            kind,
            source,
            url,
            payload,
        })
    }

    /// Returns a string field from the record's `meta` object.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.payload
            .get("meta")
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_str)
    }
}

/// Derives `YYYY-MM-DD` from a timestamp, falling back to a file day label.
pub fn event_day(timestamp: &str, file_day: Option<&str>) -> Option<String> {
    if let Some(prefix) = timestamp.get(..10) {
        return Some(prefix.to_string());
    }
    file_day.filter(|d| is_day_label(d)).map(str::to_string)
}

/// Returns whether `value` has the `YYYY-MM-DD` shape.
pub fn is_day_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

fn non_blank(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
