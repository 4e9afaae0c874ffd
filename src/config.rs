//! Configuration management for cadrads
//!
//! Settings are loaded from environment variables with defaults, validated,
//! and may then be overridden by command-line flags.
//!
//! # Environment Variables
//!
//! ## Backend
//! - `CADRADS_BACKEND`: `hosted` (default) or `local`
//! - `CADRADS_PROVIDER`: genai adapter for the hosted backend (openai, anthropic,
//!   gemini, ollama, xai, groq, ...) - default: "openai"
//! - `CADRADS_MODEL`: hosted model name - default depends on provider
//! - `CADRADS_LOCAL_MODEL`: catalogue id of the local model (e.g. "llama-3.1-8b-q6")
//! - `CADRADS_MODEL_PATH` / `CADRADS_TOKENIZER_PATH`: pre-downloaded GGUF weights
//!   and matching tokenizer.json
//! - `CADRADS_REQUEST_TIMEOUT`: per-request timeout in seconds - default: "120"
//! - `CADRADS_MAX_OUTPUT_TOKENS`: generation budget per answer - default: "512"
//!
//! ## Retry
//! - `CADRADS_MAX_ATTEMPTS`: attempts per report - default: "5"
//! - `CADRADS_BACKOFF_SECS`: delay between failed attempts - default: 30 (hosted) / 3 (local)
//! - `CADRADS_BACKOFF`: `fixed` (default) or `exponential`
//! - `CADRADS_MAX_BACKOFF_SECS`: cap for exponential backoff - default: "300"
//!
//! ## Batch
//! - `CADRADS_CONCURRENCY`: reports classified at once - default: "1"
//! - `CADRADS_BATCH_TIMEOUT`: seconds before unfinished reports are cancelled - default: unset
//! - `CADRADS_LOG_LEVEL`: logging level - default: "info"
//!
//! Provider credentials are read by genai from the provider's standard variable
//! (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, ...).

use crate::extraction::{BackoffStrategy, RetryPolicy};
use crate::llm::EmbeddedOptions;
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_HOSTED_BACKOFF_SECS: u64 = 30;
const DEFAULT_LOCAL_BACKOFF_SECS: u64 = 3;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_LOG_LEVEL: &str = "info";

const MAX_ATTEMPTS_LIMIT: u32 = 50;
const MAX_CONCURRENCY: usize = 64;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid backend: {0}. Valid options: hosted, local")]
    InvalidBackend(String),

    #[error("Invalid provider: {0}. Valid options: openai, anthropic, gemini, ollama, xai, groq, ...")]
    InvalidProvider(String),

    #[error("Invalid backoff strategy: {0}. Valid options: fixed, exponential")]
    InvalidBackoff(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which oracle answers the prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote provider reached through genai
    Hosted,
    /// Model resident in this process
    Local,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hosted" | "remote" => Ok(BackendKind::Hosted),
            "local" | "embedded" => Ok(BackendKind::Local),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Hosted => write!(f, "hosted"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Shape of the delay between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffMode {
    Fixed,
    Exponential,
}

impl FromStr for BackoffMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(BackoffMode::Fixed),
            "exponential" => Ok(BackoffMode::Exponential),
            other => Err(ConfigError::InvalidBackoff(other.to_string())),
        }
    }
}

/// Parse a genai adapter name such as `openai` or `anthropic`
pub fn parse_provider(s: &str) -> Result<AdapterKind, ConfigError> {
    AdapterKind::from_lower_str(&s.to_lowercase())
        .ok_or_else(|| ConfigError::InvalidProvider(s.to_string()))
}

/// Default hosted model for a provider
pub fn default_model_for(provider: AdapterKind) -> &'static str {
    match provider {
        AdapterKind::OpenAI => "gpt-4o",
        AdapterKind::Anthropic => "claude-3-5-sonnet-latest",
        AdapterKind::Gemini => "gemini-2.0-flash",
        AdapterKind::Ollama => "llama3.1:8b",
        _ => "default-model",
    }
}

fn default_backoff_secs(backend: BackendKind) -> u64 {
    match backend {
        BackendKind::Hosted => DEFAULT_HOSTED_BACKOFF_SECS,
        BackendKind::Local => DEFAULT_LOCAL_BACKOFF_SECS,
    }
}

/// Main configuration structure for cadrads
#[derive(Debug, Clone)]
pub struct CadradsConfig {
    pub backend: BackendKind,
    /// Hosted provider (ignored by the local backend)
    pub provider: AdapterKind,
    /// Hosted model name
    pub model: String,
    pub local_model: Option<String>,
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub backoff_mode: BackoffMode,
    pub max_backoff_secs: u64,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub batch_timeout_secs: Option<u64>,
    pub log_level: String,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Default for CadradsConfig {
    /// Loads from `CADRADS_*` environment variables, falling back to defaults
    /// for anything missing or unparseable
    fn default() -> Self {
        let backend = env::var("CADRADS_BACKEND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(BackendKind::Hosted);

        let provider = env::var("CADRADS_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::OpenAI);

        let model = env::var("CADRADS_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model_for(provider).to_string());

        let backoff_secs =
            env_parse("CADRADS_BACKOFF_SECS").unwrap_or_else(|| default_backoff_secs(backend));

        Self {
            backend,
            provider,
            model,
            local_model: env::var("CADRADS_LOCAL_MODEL").ok(),
            model_path: env::var("CADRADS_MODEL_PATH").ok().map(PathBuf::from),
            tokenizer_path: env::var("CADRADS_TOKENIZER_PATH").ok().map(PathBuf::from),
            max_attempts: env_parse("CADRADS_MAX_ATTEMPTS").unwrap_or(DEFAULT_MAX_ATTEMPTS),
            backoff_secs,
            backoff_mode: env::var("CADRADS_BACKOFF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(BackoffMode::Fixed),
            max_backoff_secs: env_parse("CADRADS_MAX_BACKOFF_SECS")
                .unwrap_or(DEFAULT_MAX_BACKOFF_SECS),
            max_output_tokens: env_parse("CADRADS_MAX_OUTPUT_TOKENS")
                .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            request_timeout_secs: env_parse("CADRADS_REQUEST_TIMEOUT")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            concurrency: env_parse("CADRADS_CONCURRENCY").unwrap_or(DEFAULT_CONCURRENCY),
            batch_timeout_secs: env_parse("CADRADS_BATCH_TIMEOUT"),
            log_level: env::var("CADRADS_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        }
    }
}

impl CadradsConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::ValidationFailed(format!(
                "Max attempts must be between 1 and {}",
                MAX_ATTEMPTS_LIMIT
            )));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::ValidationFailed(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }

        if self.max_output_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max output tokens must be at least 1".to_string(),
            ));
        }

        if self.backoff_mode == BackoffMode::Exponential && self.max_backoff_secs < self.backoff_secs
        {
            return Err(ConfigError::ValidationFailed(
                "Max backoff cannot be shorter than the base backoff".to_string(),
            ));
        }

        if self.batch_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "Batch timeout must be at least 1 second".to_string(),
            ));
        }

        if self.model_path.is_some() != self.tokenizer_path.is_some() {
            return Err(ConfigError::ValidationFailed(
                "CADRADS_MODEL_PATH and CADRADS_TOKENIZER_PATH must be set together".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Switch backend, moving the backoff to the new backend's default unless
    /// `CADRADS_BACKOFF_SECS` pins it
    pub fn set_backend(&mut self, backend: BackendKind) {
        if env::var("CADRADS_BACKOFF_SECS").is_err() {
            self.backoff_secs = default_backoff_secs(backend);
        }
        self.backend = backend;
    }

    /// Switch hosted provider, moving the model to the provider's default
    /// unless `CADRADS_MODEL` pins it
    pub fn set_provider(&mut self, provider: AdapterKind) {
        if env::var("CADRADS_MODEL").is_err() {
            self.model = default_model_for(provider).to_string();
        }
        self.provider = provider;
    }

    /// Retry settings for the per-report loop
    pub fn retry_policy(&self) -> RetryPolicy {
        let strategy = match self.backoff_mode {
            BackoffMode::Fixed => BackoffStrategy::Fixed,
            BackoffMode::Exponential => BackoffStrategy::Exponential {
                max_delay: Duration::from_secs(self.max_backoff_secs),
            },
        };
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.backoff_secs))
            .with_strategy(strategy)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }

    pub fn embedded_options(&self) -> EmbeddedOptions {
        EmbeddedOptions {
            model: self.local_model.clone(),
            model_path: self.model_path.clone(),
            tokenizer_path: self.tokenizer_path.clone(),
        }
    }

    /// Human-readable name of the configured oracle
    pub fn backend_description(&self) -> String {
        match self.backend {
            BackendKind::Hosted => format!("{} ({})", self.provider.as_str(), self.model),
            BackendKind::Local => match (&self.model_path, &self.local_model) {
                (Some(path), _) => format!("local ({})", path.display()),
                (None, Some(id)) => format!("local ({})", id),
                (None, None) => "local (auto)".to_string(),
            },
        }
    }
}

impl fmt::Display for CadradsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cadrads Configuration:")?;
        writeln!(f, "  Backend: {}", self.backend_description())?;
        writeln!(f, "  Max Attempts: {}", self.max_attempts)?;
        writeln!(
            f,
            "  Backoff: {}s ({:?})",
            self.backoff_secs, self.backoff_mode
        )?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Max Output Tokens: {}", self.max_output_tokens)?;
        writeln!(f, "  Concurrency: {}", self.concurrency)?;
        if let Some(secs) = self.batch_timeout_secs {
            writeln!(f, "  Batch Timeout: {}s", secs)?;
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
