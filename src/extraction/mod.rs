//! Extraction engine
//!
//! Turns an environment observation into a raw structured proposal using
//! an external generative model. One authoritative attempt per run.

use crate::error::OrchestrationError;
use crate::models::{EnvironmentSnapshot, RawProposal};
use crate::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, info};

pub mod ollama;
pub use ollama::OllamaClient;

/// Output format requested from the inference service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

/// Single-shot inference capability (no conversation state)
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn infer(&self, prompt: &str, mode: OutputMode) -> Result<String>;
}

pub struct ExtractionEngine {
    service: Box<dyn ExtractionService>,
}

impl ExtractionEngine {
    pub fn new(service: Box<dyn ExtractionService>) -> Self {
        Self { service }
    }

    /// Extract a raw proposal from a snapshot
    pub async fn extract(&self, snapshot: &EnvironmentSnapshot) -> Result<RawProposal> {
        let prompt = build_prompt(snapshot);

        info!(
            content_bytes = snapshot.content.len(),
            affordance_count = snapshot.affordances.len(),
            "Requesting structured extraction"
        );

        let response = self
            .service
            .infer(&prompt, OutputMode::Json)
            .await
            .map_err(|e| match e {
                OrchestrationError::ExtractionError(_) => e,
                other => OrchestrationError::ExtractionError(other.to_string()),
            })?;

        let proposal = parse_proposal(&response)?;

        debug!(keys = ?proposal.keys().collect::<Vec<_>>(), "Raw proposal received");

        Ok(proposal)
    }
}

/// Build the extraction prompt
fn build_prompt(snapshot: &EnvironmentSnapshot) -> String {
    format!(
        r#"Analyze this page and extract procurement data.
Return ONLY a JSON object with these EXACT keys and nothing else:
- "material": (string) the material being offered
- "price": (number only, remove currency symbols like '$')
- "currency": (string, three-letter code, e.g. "USD")
- "actionIdentifier": (string, the id of the element that requests the quote)

Actionable element ids on the page:
- {}

PAGE:
{}
"#,
        snapshot.affordances.join("\n- "),
        snapshot.content
    )
}

/// Parse the service response into a JSON object.
/// A Markdown ```json fence around the object is tolerated.
pub fn parse_proposal(response: &str) -> Result<RawProposal> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::ExtractionError(format!(
            "response is not valid JSON: {} | raw={}",
            e, response
        ))
    })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(OrchestrationError::ExtractionError(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Canned extraction service for development & testing
pub struct MockExtractionService {
    response: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl MockExtractionService {
    pub fn responding(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Simulates an unreachable service
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionService for MockExtractionService {
    async fn infer(&self, prompt: &str, _mode: OutputMode) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        self.response
            .clone()
            .map_err(OrchestrationError::ExtractionError)
    }
}

#[async_trait]
impl<T: ExtractionService + ?Sized> ExtractionService for std::sync::Arc<T> {
    async fn infer(&self, prompt: &str, mode: OutputMode) -> Result<String> {
        (**self).infer(prompt, mode).await
    }
}
