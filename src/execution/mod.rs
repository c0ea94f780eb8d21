//! Action executor
//!
//! This is where an approved record becomes a real-world side effect.
//! Exactly one attempt: a blind retry against an ambiguous affordance is
//! unsafe without fresh observation and approval.

use crate::environment::EnvironmentSession;
use crate::error::OrchestrationError;
use crate::models::{ApprovalDecision, ProcurementRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_identifier: String,
    pub executed_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

pub struct ActionExecutor;

impl ActionExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Perform the approved action. Requires the gate's decision as proof.
    pub async fn execute(
        &self,
        session: &mut dyn EnvironmentSession,
        record: &ProcurementRecord,
        decision: ApprovalDecision,
    ) -> Result<ActionOutcome> {
        if !decision.is_approved() {
            return Err(OrchestrationError::ExecutionError(format!(
                "refusing to invoke '{}' without approval",
                record.action_identifier()
            )));
        }

        let start = Instant::now();

        debug!(
            action_identifier = record.action_identifier(),
            "Invoking approved action"
        );

        session
            .invoke_action(record.action_identifier())
            .await
            .map_err(|e| {
                warn!(
                    action_identifier = record.action_identifier(),
                    error = %e,
                    "Action invocation failed"
                );
                match e {
                    OrchestrationError::ExecutionError(_) => e,
                    other => OrchestrationError::ExecutionError(other.to_string()),
                }
            })?;

        Ok(ActionOutcome {
            action_identifier: record.action_identifier().to_string(),
            executed_at: Utc::now(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentDriver, MockEnvironment};
    use crate::models::RejectionReason;

    fn record(action_identifier: &str) -> ProcurementRecord {
        ProcurementRecord::new(
            "Steel Rod".to_string(),
            45.0,
            "USD".to_string(),
            action_identifier.to_string(),
        )
    }

    #[tokio::test]
    async fn test_execute_approved_action() {
        let env = MockEnvironment::new("").with_affordance("quoteBtn", "Request Quote");
        let mut session = env.open().await.unwrap();

        let outcome = ActionExecutor::new()
            .execute(session.as_mut(), &record("quoteBtn"), ApprovalDecision::Approved)
            .await
            .unwrap();

        assert_eq!(outcome.action_identifier, "quoteBtn");
        assert_eq!(env.invoked(), vec!["quoteBtn".to_string()]);
    }

    #[tokio::test]
    async fn test_refuses_without_approval() {
        let env = MockEnvironment::new("").with_affordance("quoteBtn", "Request Quote");
        let mut session = env.open().await.unwrap();

        let result = ActionExecutor::new()
            .execute(
                session.as_mut(),
                &record("quoteBtn"),
                ApprovalDecision::Rejected(RejectionReason::Declined),
            )
            .await;

        assert!(matches!(result, Err(OrchestrationError::ExecutionError(_))));
        assert!(env.invoked().is_empty());
    }

    #[tokio::test]
    async fn test_missing_affordance_is_execution_error() {
        let env = MockEnvironment::new("").with_affordance("quoteBtn", "Request Quote");
        let mut session = env.open().await.unwrap();

        let result = ActionExecutor::new()
            .execute(session.as_mut(), &record("buyBtn"), ApprovalDecision::Approved)
            .await;

        assert!(matches!(result, Err(OrchestrationError::ExecutionError(_))));
    }

    #[tokio::test]
    async fn test_actuator_failure_is_not_retried() {
        let env = MockEnvironment::new("")
            .with_affordance("quoteBtn", "Request Quote")
            .failing_invoke();
        let mut session = env.open().await.unwrap();

        let result = ActionExecutor::new()
            .execute(session.as_mut(), &record("quoteBtn"), ApprovalDecision::Approved)
            .await;

        assert!(result.is_err());
        assert!(env.invoked().is_empty());
    }
}
