/// Provider trait and shared types for LLM text generation.
///
/// Backends are adapters behind the single [`Provider`] capability; the
/// conversion pipeline never depends on a specific one.
pub mod gemini;
pub mod mock;
pub mod ollama;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ProviderConfig;

/// Errors that can occur while asking a provider to generate text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    /// Configuration problems do not go away by asking again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Config(_))
    }

    /// Short label used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            ProviderError::Quota(_) => "quota",
            ProviderError::MalformedResponse(_) => "malformed-response",
            ProviderError::Transport(_) => "transport",
            ProviderError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.status().is_some_and(|s| s.as_u16() == 429) {
            ProviderError::Quota(err.to_string())
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_output_tokens: usize,
    pub temperature: f32,
    /// Ask the backend for JSON output when it supports a JSON mode.
    pub expect_json: bool,
}

/// Trait for LLM backends.
///
/// Implementations must be `Send + Sync` so a provider can be shared behind a
/// reference by the orchestrator.
pub trait Provider: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// Build the provider selected in configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.name.to_lowercase().as_str() {
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(
            &config.host,
            config.model_name(),
            timeout,
        )?)),
        "gemini" => {
            let key = std::env::var(&config.api_key_env).unwrap_or_default();
            if key.trim().is_empty() {
                return Err(ProviderError::Config(format!(
                    "Gemini API key required: set {}",
                    config.api_key_env
                )));
            }
            Ok(Box::new(gemini::GeminiProvider::new(
                &key,
                config.model_name(),
                timeout,
            )?))
        }
        other => Err(ProviderError::Config(format!(
            "unknown provider: {other} (available: ollama, gemini)"
        ))),
    }
}

/// Availability of one known backend, for the `providers` command.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: &'static str,
    pub name: &'static str,
    pub key_env: Option<String>,
    pub configured: bool,
    pub setup_hint: String,
}

pub fn list_providers(config: &ProviderConfig) -> Vec<ProviderStatus> {
    let gemini_key = std::env::var(&config.api_key_env).is_ok_and(|k| !k.trim().is_empty());
    let ollama_up = ollama::OllamaProvider::new(&config.host, config.model_name(), Duration::from_secs(2))
        .map(|p| p.is_reachable())
        .unwrap_or(false);

    vec![
        ProviderStatus {
            id: "gemini",
            name: "Google Gemini",
            key_env: Some(config.api_key_env.clone()),
            configured: gemini_key,
            setup_hint: format!("export {}='your-key'", config.api_key_env),
        },
        ProviderStatus {
            id: "ollama",
            name: "Ollama (local)",
            key_env: None,
            configured: ollama_up,
            setup_hint: format!("ollama serve (expected at {})", config.host),
        },
    ]
}
