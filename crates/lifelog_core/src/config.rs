//! Processor configuration loaded from environment variables.
//!
//! # Responsibility
//! - Provide typed settings with defaults for every pipeline stage.
//! - Keep environment parsing in one place; callers (CLI) override fields.
//!
//! # Invariants
//! - Blank variables are treated as unset.
//! - Unparseable numbers and booleans fall back to their defaults.
//! - `concurrency` and `max_retries` are always at least 1.
//!
//! ## Environment Variables
//! - `PROCESSOR_DATA_DIR`, `PROCESSOR_VAULT_DIR`
//! - `PROCESSOR_MAX_EVENTS_PER_RUN`, `PROCESSOR_OVERWRITE`
//! - `PROCESSOR_LOG_LEVEL`, `PROCESSOR_LOG_DIR`
//! - `LLM_PROVIDER`, `LLM_CONCURRENCY`, `LLM_MAX_RETRIES`,
//!   `LLM_RETRY_BASE_DELAY_MS`, `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`,
//!   `LLM_TIMEOUT_SECS`, `LLM_BASE_URL`, `LLM_MODEL`
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`
//! - `GEMINI_API_KEY`, `GEMINI_BASE_URL`, `GEMINI_MODEL`

use crate::generate::ProviderKind;
use crate::retry::RetryPolicy;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Generation backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub local_base_url: String,
    pub local_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::LlamaCpp,
            concurrency: 1,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            max_tokens: 4096,
            temperature: 0.3,
            request_timeout: Duration::from_secs(300),
            local_base_url: "http://127.0.0.1:8080/v1".to_string(),
            local_model: "local".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay)
    }
}

/// Top-level processor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Capture root; event logs live in `<data_dir>/events/`.
    pub data_dir: PathBuf,
    /// Output root for notes and the state database.
    pub vault_dir: PathBuf,
    pub max_events_per_run: Option<usize>,
    pub overwrite: bool,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub llm: LlmConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            vault_dir: PathBuf::from("vault"),
            max_events_per_run: None,
            overwrite: false,
            log_level: None,
            log_dir: None,
            llm: LlmConfig::default(),
        }
    }
}

impl ProcessorConfig {
    /// Loads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();
        let llm_defaults = LlmConfig::default();

        let provider = match env.string("LLM_PROVIDER") {
            Some(raw) => ProviderKind::from_str(&raw).unwrap_or_else(|err| {
                warn!("event=config_load module=config status=fallback key=LLM_PROVIDER error={err}");
                llm_defaults.provider
            }),
            None => llm_defaults.provider,
        };

        let llm = LlmConfig {
            provider,
            concurrency: env
                .parsed_or("LLM_CONCURRENCY", llm_defaults.concurrency)
                .max(1),
            max_retries: env
                .parsed_or("LLM_MAX_RETRIES", llm_defaults.max_retries)
                .max(1),
            retry_base_delay: env
                .parsed::<u64>("LLM_RETRY_BASE_DELAY_MS")
                .map_or(llm_defaults.retry_base_delay, Duration::from_millis),
            max_tokens: env.parsed_or("LLM_MAX_TOKENS", llm_defaults.max_tokens),
            temperature: env.parsed_or("LLM_TEMPERATURE", llm_defaults.temperature),
            request_timeout: env
                .parsed::<u64>("LLM_TIMEOUT_SECS")
                .map_or(llm_defaults.request_timeout, Duration::from_secs),
            local_base_url: env
                .string("LLM_BASE_URL")
                .map_or(llm_defaults.local_base_url, trim_slash),
            local_model: env.string("LLM_MODEL").unwrap_or(llm_defaults.local_model),
            openai_api_key: env.string("OPENAI_API_KEY"),
            openai_base_url: env
                .string("OPENAI_BASE_URL")
                .map_or(llm_defaults.openai_base_url, trim_slash),
            openai_model: env
                .string("OPENAI_MODEL")
                .unwrap_or(llm_defaults.openai_model),
            gemini_api_key: env.string("GEMINI_API_KEY"),
            gemini_base_url: env
                .string("GEMINI_BASE_URL")
                .map_or(llm_defaults.gemini_base_url, trim_slash),
            gemini_model: env
                .string("GEMINI_MODEL")
                .unwrap_or(llm_defaults.gemini_model),
        };

        Self {
            data_dir: env
                .string("PROCESSOR_DATA_DIR")
                .map_or(defaults.data_dir, PathBuf::from),
            vault_dir: env
                .string("PROCESSOR_VAULT_DIR")
                .map_or(defaults.vault_dir, PathBuf::from),
            max_events_per_run: env.parsed("PROCESSOR_MAX_EVENTS_PER_RUN"),
            overwrite: env.flag("PROCESSOR_OVERWRITE", defaults.overwrite),
            log_level: env.string("PROCESSOR_LOG_LEVEL"),
            log_dir: env.string("PROCESSOR_LOG_DIR").map(PathBuf::from),
            llm,
        }
    }

    /// Directory holding the per-day `*.jsonl` logs.
    pub fn events_dir(&self) -> PathBuf {
        self.data_dir.join("events")
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        let parsed = raw.parse().ok();
        if parsed.is_none() {
            warn!("event=config_load module=config status=fallback key={name} value={raw}");
        }
        parsed
    }

    fn parsed_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.parsed(name).unwrap_or(default)
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.string(name).map_or(default, |raw| {
            matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::ProcessorConfig;
    use crate::generate::ProviderKind;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(vars: &[(&str, &str)]) -> ProcessorConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProcessorConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = config_from(&[]);
        assert_eq!(config, ProcessorConfig::default());
        assert_eq!(config.events_dir(), PathBuf::from("data").join("events"));
    }

    #[test]
    fn variables_override_defaults() {
        let config = config_from(&[
            ("PROCESSOR_DATA_DIR", "/tmp/capture"),
            ("PROCESSOR_MAX_EVENTS_PER_RUN", "50"),
            ("PROCESSOR_OVERWRITE", "yes"),
            ("LLM_PROVIDER", "openai"),
            ("LLM_CONCURRENCY", "4"),
            ("LLM_RETRY_BASE_DELAY_MS", "5"),
            ("OPENAI_BASE_URL", "https://proxy.example/v1/"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/capture"));
        assert_eq!(config.max_events_per_run, Some(50));
        assert!(config.overwrite);
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);
        assert_eq!(config.llm.concurrency, 4);
        assert_eq!(config.llm.retry_base_delay, Duration::from_millis(5));
        assert_eq!(config.llm.openai_base_url, "https://proxy.example/v1");
    }

    #[test]
    fn invalid_and_blank_values_fall_back() {
        let config = config_from(&[
            ("LLM_CONCURRENCY", "0"),
            ("LLM_MAX_RETRIES", "many"),
            ("LLM_PROVIDER", "mystery"),
            ("PROCESSOR_VAULT_DIR", "   "),
        ]);
        assert_eq!(config.llm.concurrency, 1);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.provider, ProviderKind::LlamaCpp);
        assert_eq!(config.vault_dir, PathBuf::from("vault"));
    }
}
