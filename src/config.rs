//! Runtime configuration
//!
//! Read from the process environment (after `.env` is loaded by the binary).

use crate::approval::UnrecognizedInputPolicy;
use crate::error::OrchestrationError;
use crate::verification::{ExpectedState, VerificationPolicy};
use crate::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen3:8b";
pub const DEFAULT_TARGET_PAGE: &str = "mock_vendor/index.html";
pub const DEFAULT_AUDIT_LOG: &str = "logs/procurement_audit.log";
pub const DEFAULT_EXPECTED_STATE: &str = "Quote Sent!";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub ollama_base_url: String,
    pub model: String,
    pub extraction_timeout: Duration,
    pub target_page: PathBuf,
    pub audit_log_path: PathBuf,
    pub expected_state: ExpectedState,
    pub verification: VerificationPolicy,
    pub approval_timeout: Option<Duration>,
    pub unrecognized_input: UnrecognizedInputPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            extraction_timeout: Duration::from_secs(120),
            target_page: PathBuf::from(DEFAULT_TARGET_PAGE),
            audit_log_path: PathBuf::from(DEFAULT_AUDIT_LOG),
            expected_state: ExpectedState::new(DEFAULT_EXPECTED_STATE),
            verification: VerificationPolicy::default(),
            approval_timeout: None,
            unrecognized_input: UnrecognizedInputPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build from an explicit variable map; unset keys keep their defaults
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(vars, key);

        if let Some(url) = get("OLLAMA_BASE_URL") {
            config.ollama_base_url = url.to_string();
        }
        if let Some(model) = get("EXTRACTION_MODEL") {
            config.model = model.to_string();
        }
        if let Some(secs) = get("EXTRACTION_TIMEOUT_SECS") {
            config.extraction_timeout = Duration::from_secs(parse_number("EXTRACTION_TIMEOUT_SECS", secs)?);
        }
        if let Some(path) = get("AGENT_TARGET_PAGE") {
            config.target_page = PathBuf::from(path);
        }
        if let Some(path) = get("AUDIT_LOG_PATH") {
            config.audit_log_path = PathBuf::from(path);
        }
        // Whitespace can be significant in the expected label
        if let Some(expected) = vars.get("EXPECTED_STATE").filter(|v| !v.is_empty()) {
            config.expected_state = ExpectedState::new(expected.clone());
        }
        if let Some(ms) = get("SETTLE_DELAY_MS") {
            config.verification.settle_delay = Duration::from_millis(parse_number("SETTLE_DELAY_MS", ms)?);
        }
        if let Some(ms) = get("VERIFY_POLL_INTERVAL_MS") {
            config.verification.poll_interval =
                Duration::from_millis(parse_number("VERIFY_POLL_INTERVAL_MS", ms)?);
        }
        if let Some(n) = get("VERIFY_MAX_ATTEMPTS") {
            config.verification.max_attempts = parse_positive("VERIFY_MAX_ATTEMPTS", n)?;
        }
        if let Some(n) = get("VERIFY_STABLE_SAMPLES") {
            config.verification.stable_samples = parse_positive("VERIFY_STABLE_SAMPLES", n)?;
        }
        if let Some(secs) = get("APPROVAL_TIMEOUT_SECS") {
            config.approval_timeout = Some(Duration::from_secs(parse_number("APPROVAL_TIMEOUT_SECS", secs)?));
        }
        if let Some(policy) = get("APPROVAL_UNRECOGNIZED") {
            config.unrecognized_input = policy.parse()?;
        }
        if let Some(n) = get("APPROVAL_MAX_PROMPTS") {
            if let UnrecognizedInputPolicy::Reprompt { max_attempts } = &mut config.unrecognized_input {
                *max_attempts = parse_positive("APPROVAL_MAX_PROMPTS", n)?;
            }
        }

        Ok(config)
    }
}

fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

fn parse_positive(key: &str, value: &str) -> Result<u32> {
    match parse_number::<u32>(key, value)? {
        0 => Err(OrchestrationError::ConfigError(format!("{} must be at least 1", key))),
        n => Ok(n),
    }
}
