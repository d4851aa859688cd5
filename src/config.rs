/// Configuration module for layershift.
///
/// Handles loading, validating, and providing default configuration values.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::UnitType;
use crate::analysis::scan::ScanOptions;
use crate::convert::chunker::{Budget, BudgetUnit};

pub const DEFAULT_CONFIG_PATH: &str = "layershift.json";

// ── Default value functions ──────────────────────────────────────────

fn default_source_dir() -> String {
    "./src".to_string()
}

fn default_output_dir() -> String {
    "./converted".to_string()
}

fn default_knowledge_base_path() -> String {
    "./codebase_analysis.json".to_string()
}

fn default_summary_path() -> String {
    "./conversion_summary.json".to_string()
}

fn default_chunk_budget() -> usize {
    2500
}

fn default_budget_overrides() -> BTreeMap<String, usize> {
    BTreeMap::from([(UnitType::Controller.as_str().to_string(), 2000)])
}

fn default_convert_types() -> Vec<UnitType> {
    vec![
        UnitType::Controller,
        UnitType::Service,
        UnitType::Dao,
        UnitType::Model,
    ]
}

fn default_provider_name() -> String {
    "ollama".to_string()
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> usize {
    2048
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2000
}

// ── Config structs ───────────────────────────────────────────────────

/// Which units of the scanned tree get converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Every unit whose type is in `convert_types`.
    #[default]
    All,
    /// One controller plus the service and DAO that share its base name.
    Matched,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_knowledge_base_path")]
    pub knowledge_base_path: String,

    #[serde(default = "default_summary_path")]
    pub summary_path: String,

    /// Glob patterns (relative to `source_dir`) skipped during the scan.
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub include_tests: bool,

    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,

    #[serde(default)]
    pub budget_unit: BudgetUnit,

    /// Per-type budget, keyed by type name (`Controller`, `Service`, `DAO`, ...).
    #[serde(default = "default_budget_overrides")]
    pub budget_overrides: BTreeMap<String, usize>,

    #[serde(default = "default_convert_types")]
    pub convert_types: Vec<UnitType>,

    #[serde(default)]
    pub selection: Selection,

    /// Ask the provider for a one-paragraph description of every unit.
    #[serde(default)]
    pub describe_units: bool,

    /// Package prefix that marks project-internal imports. Derived from
    /// each unit's own package when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_package: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Minimum gap between two consecutive provider calls.
    #[serde(default = "default_delay_ms")]
    pub call_spacing_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Model identifier. Each backend has its own default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Ollama server URL.
    #[serde(default = "default_host")]
    pub host: String,

    /// Environment variable holding the Gemini API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            knowledge_base_path: default_knowledge_base_path(),
            summary_path: default_summary_path(),
            exclude: Vec::new(),
            include_tests: false,
            chunk_budget: default_chunk_budget(),
            budget_unit: BudgetUnit::default(),
            budget_overrides: default_budget_overrides(),
            convert_types: default_convert_types(),
            selection: Selection::default(),
            describe_units: false,
            project_package: None,
            retry: RetryConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            call_spacing_ms: default_delay_ms(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            model: None,
            host: default_host(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"layershift.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_budget > 0, "chunk_budget must be positive");
        anyhow::ensure!(
            self.budget_overrides.values().all(|&b| b > 0),
            "budget_overrides must be positive"
        );
        for key in self.budget_overrides.keys() {
            anyhow::ensure!(
                parse_unit_type(key).is_some(),
                "budget_overrides has unknown unit type: {key}"
            );
        }
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.provider.max_output_tokens > 0,
            "provider.max_output_tokens must be positive"
        );
        anyhow::ensure!(
            self.provider.timeout_secs > 0,
            "provider.timeout_secs must be positive"
        );
        anyhow::ensure!(
            !self.source_dir.trim().is_empty(),
            "source_dir must be specified"
        );
        anyhow::ensure!(
            !self.output_dir.trim().is_empty(),
            "output_dir must be specified"
        );
        Ok(())
    }

    /// Apply `LLM_PROVIDER`, `OLLAMA_MODEL` and `OLLAMA_HOST` from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = lookup("LLM_PROVIDER") {
            info!("Provider overridden by LLM_PROVIDER: {name}");
            self.provider.name = name.trim().to_lowercase();
        }
        if self.provider.name == "ollama" {
            if let Some(model) = lookup("OLLAMA_MODEL") {
                self.provider.model = Some(model);
            }
            if let Some(host) = lookup("OLLAMA_HOST") {
                self.provider.host = host;
            }
        }
    }

    /// Chunk budget for units of `unit_type`.
    #[must_use]
    pub fn budget_for(&self, unit_type: UnitType) -> Budget {
        let limit = self
            .budget_overrides
            .get(unit_type.as_str())
            .copied()
            .unwrap_or(self.chunk_budget);
        Budget {
            limit,
            unit: self.budget_unit,
        }
    }

    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            include_tests: self.include_tests,
            exclude: self.exclude.clone(),
        }
    }

    #[must_use]
    pub fn should_convert(&self, unit_type: UnitType) -> bool {
        self.convert_types.contains(&unit_type)
    }
}

impl ProviderConfig {
    /// Configured model, or the backend's default.
    #[must_use]
    pub fn model_name(&self) -> &str {
        match (&self.model, self.name.as_str()) {
            (Some(model), _) => model.as_str(),
            (None, "gemini") => "gemini-2.0-flash",
            (None, _) => "llama3",
        }
    }
}

fn parse_unit_type(name: &str) -> Option<UnitType> {
    [
        UnitType::Controller,
        UnitType::Service,
        UnitType::Dao,
        UnitType::Model,
        UnitType::Other,
    ]
    .into_iter()
    .find(|t| t.as_str() == name)
}

// ── Tests ────────────────────────────────────────────────────────────
