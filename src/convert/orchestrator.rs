//! Drives provider calls for chunks: bounded retry, call spacing, cancellation.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, RetryConfig};
use crate::convert::chunker::Chunk;
use crate::convert::prompt;
use crate::convert::sanitize::{OutputFormat, SanitizeFailure, sanitize, sanitize_json};
use crate::provider::{GenerateRequest, Provider, ProviderError};

// ── Retry policy ─────────────────────────────────────────────────────

/// Delay before the next attempt, given how many attempts have been made.
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub backoff: Box<dyn Backoff>,
    /// Minimum gap between the starts of two consecutive provider calls.
    pub call_spacing: Duration,
}

impl RetryPolicy {
    /// No waiting at all. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Box::new(FixedBackoff(Duration::ZERO)),
            call_spacing: Duration::ZERO,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Box::new(FixedBackoff(Duration::from_millis(config.delay_ms))),
            call_spacing: Duration::from_millis(config.call_spacing_ms),
        }
    }
}

// ── Cancellation ─────────────────────────────────────────────────────

/// Run-wide stop flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Results ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkFailure {
    #[error("provider failed after {attempts} attempt(s): {error}")]
    Provider { error: ProviderError, attempts: u32 },

    #[error(transparent)]
    Sanitize(#[from] SanitizeFailure),

    #[error("cancelled before the provider was called")]
    Cancelled,
}

impl ChunkFailure {
    /// Short label for run summaries, e.g. `timeout` or `sanitize`.
    pub fn label(&self) -> &'static str {
        match self {
            ChunkFailure::Provider { error, .. } => error.kind(),
            ChunkFailure::Sanitize(_) => "sanitize",
            ChunkFailure::Cancelled => "cancelled",
        }
    }
}

/// Outcome of translating one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    pub index: usize,
    /// Provider output before sanitizing, when the provider answered.
    pub raw: Option<String>,
    pub outcome: Result<String, ChunkFailure>,
    pub attempts: u32,
}

impl TranslationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct Orchestrator<'a, P: Provider + ?Sized> {
    provider: &'a P,
    policy: RetryPolicy,
    cancel: CancelToken,
    temperature: f32,
    max_output_tokens: usize,
    last_call: Option<Instant>,
}

impl<'a, P: Provider + ?Sized> Orchestrator<'a, P> {
    pub fn new(provider: &'a P, policy: RetryPolicy, cancel: CancelToken) -> Self {
        let defaults = ProviderConfig::default();
        Self {
            provider,
            policy,
            cancel,
            temperature: defaults.temperature,
            max_output_tokens: defaults.max_output_tokens,
            last_call: None,
        }
    }

    #[must_use]
    pub fn with_generation(mut self, config: &ProviderConfig) -> Self {
        self.temperature = config.temperature;
        self.max_output_tokens = config.max_output_tokens;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Translates one chunk into target code.
    pub fn translate(&mut self, chunk: &Chunk<'_>) -> TranslationResult {
        let (outcome, attempts) = self.generate(prompt::conversion_prompt(chunk), false);
        let raw = match outcome {
            Ok(raw) => raw,
            Err(failure) => {
                return TranslationResult {
                    index: chunk.index,
                    raw: None,
                    outcome: Err(failure),
                    attempts,
                };
            }
        };

        let outcome = sanitize(&raw, OutputFormat::Code).map_err(|e| {
            warn!(
                "Chunk {}/{} of {}: {}",
                chunk.index + 1,
                chunk.total,
                chunk.unit.path,
                e
            );
            ChunkFailure::from(e)
        });
        TranslationResult {
            index: chunk.index,
            raw: Some(raw),
            outcome,
            attempts,
        }
    }

    /// Translates chunks strictly in order. Chunks reached after cancellation
    /// come back as [`ChunkFailure::Cancelled`] without a provider call.
    pub fn translate_unit<'c>(
        &mut self,
        chunks: impl IntoIterator<Item = Chunk<'c>>,
    ) -> Vec<TranslationResult> {
        chunks
            .into_iter()
            .map(|chunk| {
                if chunk.total > 1 {
                    info!(
                        "  Converting chunk {}/{} of {}",
                        chunk.index + 1,
                        chunk.total,
                        chunk.unit.name()
                    );
                }
                self.translate(&chunk)
            })
            .collect()
    }

    /// One-paragraph description of the unit, from a JSON-mode call on `chunk`.
    pub fn describe(&mut self, chunk: &Chunk<'_>) -> Result<String, ChunkFailure> {
        let (outcome, _) = self.generate(prompt::describe_prompt(chunk), true);
        let value = sanitize_json(&outcome?)?;
        match value.get("description").and_then(|d| d.as_str()) {
            Some(description) if !description.trim().is_empty() => {
                Ok(description.trim().to_string())
            }
            _ => Err(ChunkFailure::Sanitize(SanitizeFailure {
                reason: "response has no description".to_string(),
                raw: value.to_string(),
            })),
        }
    }

    /// Free-text completion, trimmed.
    pub fn complete(&mut self, prompt: String) -> Result<String, ChunkFailure> {
        let (outcome, _) = self.generate(prompt, false);
        Ok(outcome?.trim().to_string())
    }

    fn generate(&mut self, prompt: String, expect_json: bool) -> (Result<String, ChunkFailure>, u32) {
        let request = GenerateRequest {
            prompt,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            expect_json,
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if self.cancel.is_cancelled() {
                return (Err(ChunkFailure::Cancelled), attempts);
            }
            self.wait_for_spacing();
            attempts += 1;
            debug!(
                "Calling {} (attempt {attempts}/{max_attempts})",
                self.provider.name()
            );

            match self.provider.generate(&request) {
                Ok(text) => {
                    if attempts > 1 {
                        info!("Provider call succeeded after {} retries", attempts - 1);
                    }
                    return (Ok(text), attempts);
                }
                Err(error) => {
                    if !error.is_retryable() || attempts >= max_attempts {
                        warn!("Provider call failed after {attempts} attempt(s): {error}");
                        return (Err(ChunkFailure::Provider { error, attempts }), attempts);
                    }
                    let delay = self.policy.backoff.delay(attempts);
                    warn!(
                        "Provider call failed (attempt {attempts}/{max_attempts}): {error}; retrying in {delay:?}"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    fn wait_for_spacing(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.policy.call_spacing {
                std::thread::sleep(self.policy.call_spacing - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SourceUnit;
    use crate::convert::chunker::{Budget, chunk};
    use crate::provider::mock::ScriptedProvider;

    const DAO: &str = "package com.acme.dao;\n\n@Repository\npublic class FilmDao {\n    public Film find(int id) {\n        return jdbc.query(id);\n    }\n\n    public void delete(int id) {\n        jdbc.update(id);\n    }\n}\n";

    fn unit() -> SourceUnit {
        SourceUnit::new("com/acme/dao/FilmDao.java", DAO)
    }

    #[test]
    fn test_error_then_success() {
        let unit = unit();
        let first = chunk(&unit, Budget::tokens(5000)).next().unwrap();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Timeout("slow".into())),
            Ok("```js\nasync function find(id) {}\nmodule.exports = { find };\n```".into()),
        ]);
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(3), CancelToken::new());

        let result = orchestrator.translate(&first);
        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        assert!(result.attempts <= 3);
        assert_eq!(
            result.text().unwrap(),
            "async function find(id) {}\nmodule.exports = { find };"
        );
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_retries_exhausted() {
        let unit = unit();
        let first = chunk(&unit, Budget::tokens(5000)).next().unwrap();
        let provider = ScriptedProvider::from_fn(|_| Err(ProviderError::Quota("429".into())));
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(3), CancelToken::new());

        let result = orchestrator.translate(&first);
        assert_eq!(result.attempts, 3);
        assert!(result.raw.is_none());
        assert!(matches!(
            result.outcome,
            Err(ChunkFailure::Provider {
                error: ProviderError::Quota(_),
                attempts: 3
            })
        ));
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn test_config_error_not_retried() {
        let unit = unit();
        let first = chunk(&unit, Budget::tokens(5000)).next().unwrap();
        let provider = ScriptedProvider::from_fn(|_| Err(ProviderError::Config("no key".into())));
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(5), CancelToken::new());

        let result = orchestrator.translate(&first);
        assert_eq!(result.attempts, 1);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_sanitize_failure_is_not_retried() {
        let unit = unit();
        let first = chunk(&unit, Budget::tokens(5000)).next().unwrap();
        let provider = ScriptedProvider::from_fn(|_| Ok("Sorry, I cannot help with that.".into()));
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(3), CancelToken::new());

        let result = orchestrator.translate(&first);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.raw.as_deref(), Some("Sorry, I cannot help with that."));
        assert!(matches!(result.outcome, Err(ChunkFailure::Sanitize(_))));
    }

    #[test]
    fn test_unit_results_in_chunk_order() {
        let unit = unit();
        let chunks = chunk(&unit, Budget::chars(100));
        let total = chunks.len();
        assert!(total >= 2);

        let provider = ScriptedProvider::from_fn(|r| {
            let marker = (1..=9)
                .find(|i| r.prompt.contains(&format!("chunk {i} of")))
                .unwrap_or(0);
            Ok(format!("const part{marker} = {marker};"))
        });
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(1), CancelToken::new());

        let results = orchestrator.translate_unit(chunks);
        assert_eq!(results.len(), total);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.text().unwrap(), format!("const part{} = {};", i + 1, i + 1));
        }
    }

    #[test]
    fn test_cancel_stops_further_calls() {
        let unit = unit();
        let chunks = chunk(&unit, Budget::chars(100));
        let total = chunks.len();
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let provider = ScriptedProvider::from_fn(move |_| {
            trigger.cancel();
            Ok("const a = 1;".into())
        });
        let mut orchestrator = Orchestrator::new(&provider, RetryPolicy::immediate(3), cancel);

        let results = orchestrator.translate_unit(chunks);
        assert_eq!(provider.calls(), 1);
        assert!(results[0].is_success());
        assert_eq!(results.len(), total);
        assert!(
            results[1..]
                .iter()
                .all(|r| r.outcome == Err(ChunkFailure::Cancelled) && r.attempts == 0)
        );
    }

    #[test]
    fn test_describe_reads_json_description() {
        let unit = unit();
        let first = chunk(&unit, Budget::tokens(5000)).next().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(
            "```json\n{\"description\": \"Film data access.\", \"methods\": [],}\n```".into(),
        )]);
        let mut orchestrator =
            Orchestrator::new(&provider, RetryPolicy::immediate(1), CancelToken::new());
        assert_eq!(orchestrator.describe(&first).unwrap(), "Film data access.");
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            delay_ms: 1500,
            call_spacing_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff.delay(2), Duration::from_millis(1500));
        assert_eq!(policy.call_spacing, Duration::from_millis(10));
    }
}
