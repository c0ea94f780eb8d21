//! Error types for the procurement agent orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::SchemaViolation;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] SchemaViolation),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// For callers that treat a mismatch as an error. The orchestrator
    /// reports mismatches as run outcomes and never raises this.
    #[error("Verification mismatch: expected {expected:?}, observed {observed:?}")]
    VerificationMismatch { expected: String, observed: String },

    #[error("Environment session error: {0}")]
    SessionError(String),

    #[error("Approval error: {0}")]
    ApprovalError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("System error: {0}")]
    SystemError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification of a failed run, carried in reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Extraction,
    Validation,
    Execution,
    Verification,
    System,
}

impl OrchestrationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OrchestrationError::ExtractionError(_) | OrchestrationError::HttpError(_) => {
                FailureKind::Extraction
            }
            OrchestrationError::ValidationError(_) => FailureKind::Validation,
            OrchestrationError::ExecutionError(_) => FailureKind::Execution,
            OrchestrationError::VerificationMismatch { .. } => FailureKind::Verification,
            _ => FailureKind::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = OrchestrationError::ExtractionError("connection refused".to_string());
        assert_eq!(err.kind(), FailureKind::Extraction);

        let err = OrchestrationError::ValidationError(SchemaViolation::MissingField("price"));
        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(err.to_string().contains("price"));

        let err = OrchestrationError::VerificationMismatch {
            expected: "Quote Sent!".to_string(),
            observed: "Processing...".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::Verification);

        let err = OrchestrationError::SessionError("browser crashed".to_string());
        assert_eq!(err.kind(), FailureKind::System);
    }
}
