//! HTTP-backed generators (blocking `ureq` clients).
//!
//! Request timeouts live here; the retry layer and the executor never time
//! out a call themselves.

use super::{GenerationError, GenerationErrorKind, GenerationResult, Generator};
use crate::config::LlmConfig;
use crate::logging::sanitize_message;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const MAX_ERROR_BODY_CHARS: usize = 300;

/// OpenAI chat-completions client, also used for local llama.cpp servers.
pub struct OpenAiCompatibleGenerator {
    name: &'static str,
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiCompatibleGenerator {
    pub fn openai(config: &LlmConfig) -> GenerationResult<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            GenerationError::new(GenerationErrorKind::Config, "OPENAI_API_KEY is required")
        })?;
        Ok(Self {
            name: "openai",
            agent: build_agent(config),
            endpoint: format!("{}/chat/completions", config.openai_base_url),
            api_key: Some(api_key),
            model: config.openai_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn llama_cpp(config: &LlmConfig) -> Self {
        Self {
            name: "llama_cpp",
            agent: build_agent(config),
            endpoint: format!("{}/chat/completions", config.local_base_url),
            api_key: None,
            model: config.local_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Generator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        self.name
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let authorization = self.api_key.as_ref().map(|key| format!("Bearer {key}"));
        let headers: Vec<(&str, &str)> = authorization
            .as_deref()
            .map(|value| ("Authorization", value))
            .into_iter()
            .collect();

        let response: ChatResponse = post_json(self.name, &self.agent, &self.endpoint, &headers, &body)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::new(
                    GenerationErrorKind::MalformedOutput,
                    format!("{} returned no message content", self.name),
                )
            })
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiGenerator {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: [GeminiContent<'a>; 1],
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[derive(Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> GenerationResult<Self> {
        let api_key = config.gemini_api_key.clone().ok_or_else(|| {
            GenerationError::new(GenerationErrorKind::Config, "GEMINI_API_KEY is required")
        })?;
        Ok(Self {
            agent: build_agent(config),
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.gemini_base_url, config.gemini_model
            ),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, system: &str, user: &str) -> GenerationResult<String> {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: [GeminiPart { text: system }],
            },
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart { text: user }],
            }],
            generation_config: GeminiGenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };
        let headers = [("x-goog-api-key", self.api_key.as_str())];

        let response: GeminiResponse =
            post_json(self.name(), &self.agent, &self.endpoint, &headers, &body)?;
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::new(
                GenerationErrorKind::MalformedOutput,
                "gemini returned no candidate text",
            ));
        }
        Ok(text)
    }
}

fn build_agent(config: &LlmConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(config.request_timeout)
        .build()
}

fn post_json<B, R>(
    provider: &str,
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &B,
) -> GenerationResult<R>
where
    B: Serialize,
    R: DeserializeOwned,
{
    let started_at = Instant::now();
    let mut request = agent.post(url);
    for (name, value) in headers {
        request = request.set(name, value);
    }

    let result = match request.send_json(body) {
        Ok(response) => response.into_json::<R>().map_err(|err| {
            GenerationError::new(
                GenerationErrorKind::MalformedOutput,
                format!("undecodable response body: {err}"),
            )
        }),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(GenerationError::from_status(
                status,
                sanitize_message(&body, MAX_ERROR_BODY_CHARS),
            ))
        }
        Err(ureq::Error::Transport(transport)) => Err(GenerationError::new(
            transport_kind(transport.kind()),
            transport.to_string(),
        )),
    };

    debug!(
        "event=generate_call module=generate status={} provider={} duration_ms={}",
        if result.is_ok() { "ok" } else { "error" },
        provider,
        started_at.elapsed().as_millis()
    );
    result
}

/// Only network-level failures are worth retrying; malformed URLs and proxy
/// settings fail the same way on every attempt.
fn transport_kind(kind: ureq::ErrorKind) -> GenerationErrorKind {
    use ureq::ErrorKind;
    match kind {
        ErrorKind::Dns | ErrorKind::ConnectionFailed | ErrorKind::Io | ErrorKind::ProxyConnect => {
            GenerationErrorKind::Transport
        }
        ErrorKind::InvalidUrl
        | ErrorKind::UnknownScheme
        | ErrorKind::InsecureRequestHttpsOnly
        | ErrorKind::InvalidProxyUrl
        | ErrorKind::ProxyUnauthorized => GenerationErrorKind::Config,
        _ => GenerationErrorKind::InvalidRequest,
    }
}
