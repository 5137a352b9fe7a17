//! Content generation capability and its error taxonomy.
//!
//! # Responsibility
//! - Define the narrow [`Generator`] interface used by the planner and the
//!   note workers.
//! - Classify failures into retriable and fatal kinds.
//! - Decorate any generator with the retry policy ([`RetryingGenerator`]).
//!
//! # Invariants
//! - Retriability is a pure function of [`GenerationErrorKind`].
//! - A generator instance is constructed once per pipeline run and shared;
//!   there is no process-global client.

use crate::retry::{with_retry, Retriable, RetryPolicy};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod http;
pub mod provider;

pub use provider::{build_generator, ProviderKind};

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failure class of one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationErrorKind {
    /// HTTP 429 or an equivalent quota signal.
    RateLimited,
    /// HTTP 500/502/503/504 or an overloaded backend.
    Unavailable,
    /// Connection could not be established or was cut.
    Transport,
    InvalidRequest,
    Unauthorized,
    /// Response did not contain the expected structured content.
    MalformedOutput,
    /// Provider is misconfigured (missing key, unknown provider).
    Config,
}

impl GenerationErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable | Self::Transport)
    }

    /// Maps an HTTP status code to an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            500 | 502 | 503 | 504 => Self::Unavailable,
            401 | 403 => Self::Unauthorized,
            _ => Self::InvalidRequest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Transport => "transport",
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::MalformedOutput => "malformed_output",
            Self::Config => "config",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: impl Display) -> Self {
        Self::new(
            GenerationErrorKind::from_status(status),
            format!("HTTP {status}: {body}"),
        )
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "generation failed ({}): {}", self.kind.as_str(), self.message)
    }
}

impl Error for GenerationError {}

impl Retriable for GenerationError {
    fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

/// Produces text from a system instruction and a user payload.
///
/// Implementations are expected to return JSON text when the system
/// instruction asks for it; see [`generate_json`].
pub trait Generator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String>;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        (**self).generate(system, user)
    }
}

/// Generator decorator applying a [`RetryPolicy`] to every call.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<G: Generator> Generator for RetryingGenerator<G> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        with_retry(&self.policy, || self.inner.generate(system, user))
    }
}

/// Calls `generator` and decodes its reply as JSON into `T`.
///
/// Markdown code fences around the JSON are tolerated. Decoding failures are
/// [`GenerationErrorKind::MalformedOutput`] and therefore not retried.
pub fn generate_json<T: DeserializeOwned>(
    generator: &dyn Generator,
    system: &str,
    user: &str,
) -> GenerationResult<T> {
    let raw = generator.generate(system, user)?;
    serde_json::from_str(strip_code_fence(&raw)).map_err(|err| {
        GenerationError::new(
            GenerationErrorKind::MalformedOutput,
            format!("{} returned undecodable JSON: {err}", generator.name()),
        )
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
