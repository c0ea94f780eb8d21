//! Ollama API client for structured extraction
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! The request timeout bounds the only network suspension in a run.

use super::{ExtractionService, OutputMode};
use crate::error::OrchestrationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Reusable Ollama client (connection-pooled)
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ExtractionService for OllamaClient {
    async fn infer(&self, prompt: &str, mode: OutputMode) -> crate::Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            format: match mode {
                OutputMode::Json => Some("json"),
                OutputMode::Text => None,
            },
            stream: false,
        };

        info!(model = %self.model, "Calling Ollama API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama API request failed: {}", e);
                OrchestrationError::ExtractionError(format!("Ollama API unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama API error response: {}", error_text);
            return Err(OrchestrationError::ExtractionError(format!(
                "Ollama API returned {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Ollama response: {}", e);
            OrchestrationError::ExtractionError(format!("Ollama parse error: {}", e))
        })?;

        info!(
            model = %self.model,
            response_bytes = generated.response.len(),
            done = generated.done,
            "Ollama response received"
        );

        Ok(generated.response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            model: "qwen3:8b",
            prompt: "Extract procurement data",
            format: Some("json"),
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen3:8b");
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_text_mode_omits_format() {
        let request = GenerateRequest {
            model: "qwen3:8b",
            prompt: "hello",
            format: None,
            stream: false,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("format"));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"model":"qwen3:8b","response":"{\"material\":\"Steel Rod\"}","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "{\"material\":\"Steel Rod\"}");
        assert!(parsed.done);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = OllamaClient::new("http://127.0.0.1:1/", "qwen3:8b", Duration::from_secs(2)).unwrap();
        assert_eq!(client.model(), "qwen3:8b");
        let err = client.infer("prompt", OutputMode::Json).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ExtractionError(_)));
    }
}
