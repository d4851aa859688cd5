/// Local Ollama backend over its HTTP API (`/api/generate`).
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerateRequest, Provider, ProviderError};

pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaProvider {
    pub fn new(host: &str, model: &str, timeout: Duration) -> Result<Self, ProviderError> {
        if host.trim().is_empty() {
            return Err(ProviderError::Config("Ollama host is required".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("layershift")
            .build()
            .map_err(|e| ProviderError::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Whether the server answers and has the configured model pulled.
    pub fn is_reachable(&self) -> bool {
        match self.model_exists() {
            Ok(found) => found,
            Err(e) => {
                debug!("Ollama not reachable at {}: {e}", self.host);
                false
            }
        }
    }

    pub fn model_exists(&self) -> Result<bool, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()?
            .error_for_status()?;
        let tags: TagsResponse = resp.json()?;
        Ok(tags.models.iter().any(|m| m.name.starts_with(&self.model)))
    }
}

impl Provider for OllamaProvider {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format: request.expect_json.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body)
            .send()?
            .error_for_status()?;

        let parsed: OllamaResponse = resp.json()?;
        parsed.response.ok_or_else(|| {
            ProviderError::MalformedResponse("Ollama response has no `response` field".to_string())
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
