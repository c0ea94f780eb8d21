//! Post-action verification
//!
//! Re-observes the affordance named by the record and compares its state
//! against the terminal value supplied by policy. Bounded poll: a fixed
//! settle delay, then at most `max_attempts` samples.

use crate::environment::EnvironmentSession;
use crate::error::OrchestrationError;
use crate::models::ProcurementRecord;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal state the affordance must reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedState(pub String);

impl ExpectedState {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    /// The surface settled on a state other than the expected one
    Mismatched { observed: String },
    /// The surface was still changing when attempts ran out
    TimedOut { last_observed: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Consecutive identical samples that count as "settled"
    pub stable_samples: u32,
}

impl VerificationPolicy {
    /// One settle-then-check sample
    pub fn single_sample(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            poll_interval: Duration::ZERO,
            max_attempts: 1,
            stable_samples: 1,
        }
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(250),
            max_attempts: 8,
            stable_samples: 3,
        }
    }
}

/// Exact comparison; prefixes and substrings do not count
pub fn compare_state(observed: &str, expected: &ExpectedState) -> VerificationOutcome {
    if observed == expected.as_str() {
        VerificationOutcome::Verified
    } else {
        VerificationOutcome::Mismatched {
            observed: observed.to_string(),
        }
    }
}

pub struct Verifier {
    policy: VerificationPolicy,
}

impl Verifier {
    pub fn new(policy: VerificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub async fn verify(
        &self,
        session: &mut dyn EnvironmentSession,
        record: &ProcurementRecord,
        expected: &ExpectedState,
    ) -> Result<VerificationOutcome> {
        let max_attempts = self.policy.max_attempts.max(1);
        // The last allowed sample must still be able to settle
        let stable_needed = self.policy.stable_samples.min(max_attempts).max(1);

        tokio::time::sleep(self.policy.settle_delay).await;

        let mut last_observed = String::new();
        let mut stable_run = 0u32;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.poll_interval).await;
            }

            let observed = session
                .read_affordance_state(record.action_identifier())
                .await
                .map_err(|e| match e {
                    OrchestrationError::ExecutionError(_) => e,
                    other => OrchestrationError::ExecutionError(format!(
                        "cannot read state of '{}': {}",
                        record.action_identifier(),
                        other
                    )),
                })?;

            debug!(
                attempt,
                action_identifier = record.action_identifier(),
                observed = %observed,
                "Affordance state sampled"
            );

            if let VerificationOutcome::Verified = compare_state(&observed, expected) {
                info!(attempt, "Verification passed");
                return Ok(VerificationOutcome::Verified);
            }

            stable_run = if attempt > 1 && observed == last_observed {
                stable_run + 1
            } else {
                1
            };
            last_observed = observed;

            if stable_run >= stable_needed {
                warn!(
                    attempt,
                    observed = %last_observed,
                    expected = expected.as_str(),
                    "Affordance settled on unexpected state"
                );
                return Ok(VerificationOutcome::Mismatched {
                    observed: last_observed,
                });
            }
        }

        warn!(
            max_attempts,
            last_observed = %last_observed,
            "Affordance never settled before verification attempts ran out"
        );

        Ok(VerificationOutcome::TimedOut { last_observed })
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerificationPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentDriver, MockEnvironment};

    fn record() -> ProcurementRecord {
        ProcurementRecord::new(
            "Steel Rod".to_string(),
            45.0,
            "USD".to_string(),
            "quoteBtn".to_string(),
        )
    }

    fn fast_policy(max_attempts: u32, stable_samples: u32) -> VerificationPolicy {
        VerificationPolicy {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            max_attempts,
            stable_samples,
        }
    }

    async fn clicked(after_click: &[&str]) -> (MockEnvironment, Box<dyn EnvironmentSession>) {
        let env = MockEnvironment::new("")
            .with_affordance("quoteBtn", "Request Quote")
            .with_after_click("quoteBtn", after_click);
        let mut session = env.open().await.unwrap();
        session.invoke_action("quoteBtn").await.unwrap();
        (env, session)
    }

    #[test]
    fn test_compare_is_exact() {
        let expected = ExpectedState::new("Quote Sent!");
        assert_eq!(compare_state("Quote Sent!", &expected), VerificationOutcome::Verified);

        for near_miss in ["Quote Sent", "Quote Sent!!", " Quote Sent!", "quote sent!", ""] {
            assert_eq!(
                compare_state(near_miss, &expected),
                VerificationOutcome::Mismatched {
                    observed: near_miss.to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_single_sample_verified() {
        let (_env, mut session) = clicked(&["Quote Sent!"]).await;
        let verifier = Verifier::new(VerificationPolicy::single_sample(Duration::ZERO));

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::Verified);
    }

    #[tokio::test]
    async fn test_single_sample_mismatch() {
        let (env, mut session) = clicked(&["Processing...", "Quote Sent!"]).await;
        let verifier = Verifier::new(VerificationPolicy::single_sample(Duration::ZERO));

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Mismatched {
                observed: "Processing...".to_string()
            }
        );
        assert_eq!(env.reads(), 1);
    }

    #[tokio::test]
    async fn test_poll_waits_for_transition() {
        let (env, mut session) = clicked(&["Processing...", "Quote Sent!"]).await;
        let verifier = Verifier::new(fast_policy(5, 3));

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationOutcome::Verified);
        assert_eq!(env.reads(), 2);
    }

    #[tokio::test]
    async fn test_poll_settled_on_wrong_state() {
        let (env, mut session) = clicked(&["Processing..."]).await;
        let verifier = Verifier::new(fast_policy(8, 3));

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Mismatched {
                observed: "Processing...".to_string()
            }
        );
        assert_eq!(env.reads(), 3);
    }

    #[tokio::test]
    async fn test_poll_times_out_while_changing() {
        let (_env, mut session) = clicked(&["Sending.", "Sending..", "Sending...", "Sending...."]).await;
        let verifier = Verifier::new(fast_policy(3, 2));

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::TimedOut {
                last_observed: "Sending...".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_settle_requirement_capped_by_attempts() {
        let (env, mut session) = clicked(&["Processing..."]).await;
        let verifier = Verifier::new(fast_policy(1, 3));
        assert_eq!(verifier.policy().stable_samples, 3);

        let outcome = verifier
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Mismatched {
                observed: "Processing...".to_string()
            }
        );
        assert_eq!(env.reads(), 1);

        let (_env, mut session) = clicked(&["Processing..."]).await;
        let outcome = Verifier::new(fast_policy(2, 5))
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::Mismatched { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_affordance() {
        let env = MockEnvironment::new("").with_affordance("otherBtn", "Other");
        let mut session = env.open().await.unwrap();

        let result = Verifier::new(fast_policy(1, 1))
            .verify(session.as_mut(), &record(), &ExpectedState::new("Quote Sent!"))
            .await;
        assert!(matches!(result, Err(OrchestrationError::ExecutionError(_))));
    }
}
