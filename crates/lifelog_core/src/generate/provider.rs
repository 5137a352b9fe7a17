//! Provider selection: one [`Generator`] implementation per backend,
//! chosen once at startup.

use super::http::{GeminiGenerator, OpenAiCompatibleGenerator};
use super::{GenerationError, GenerationErrorKind, GenerationResult, Generator};
use crate::config::LlmConfig;
use log::info;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local llama.cpp server speaking the OpenAI chat API.
    LlamaCpp,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::LlamaCpp, Self::OpenAi, Self::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlamaCpp => "llama_cpp",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                GenerationError::new(
                    GenerationErrorKind::Config,
                    format!(
                        "unknown provider `{normalized}`; expected llama_cpp|openai|gemini"
                    ),
                )
            })
    }
}

/// Builds the generator for `kind` from backend settings.
///
/// The returned generator is not wrapped in retries; callers decorate it
/// with [`super::RetryingGenerator`].
pub fn build_generator(
    kind: ProviderKind,
    config: &LlmConfig,
) -> GenerationResult<Box<dyn Generator>> {
    let generator: Box<dyn Generator> = match kind {
        ProviderKind::LlamaCpp => Box::new(OpenAiCompatibleGenerator::llama_cpp(config)),
        ProviderKind::OpenAi => Box::new(OpenAiCompatibleGenerator::openai(config)?),
        ProviderKind::Gemini => Box::new(GeminiGenerator::new(config)?),
    };
    info!(
        "event=provider_init module=generate status=ok provider={}",
        generator.name()
    );
    Ok(generator)
}
