//! Core data models for the procurement agent

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::FailureKind;

//
// ================= Proposal =================
//

/// Unvalidated JSON object returned by the extraction engine.
pub type RawProposal = serde_json::Map<String, serde_json::Value>;

/// A schema-validated proposal. Only the validator constructs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcurementRecord {
    material: String,
    price: f64,
    currency: String,
    #[serde(rename = "actionIdentifier")]
    action_identifier: String,
}

impl ProcurementRecord {
    pub(crate) fn new(
        material: String,
        price: f64,
        currency: String,
        action_identifier: String,
    ) -> Self {
        Self {
            material,
            price,
            currency,
            action_identifier,
        }
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn action_identifier(&self) -> &str {
        &self.action_identifier
    }
}

//
// ================= Environment =================
//

/// Point-in-time observation of the target surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Serialized surface content (e.g. page HTML)
    pub content: String,
    /// Identifiers of the actionable elements visible at capture time
    pub affordances: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    pub fn new(content: impl Into<String>, affordances: Vec<String>) -> Self {
        Self {
            content: content.into(),
            affordances,
            captured_at: Utc::now(),
        }
    }

    pub fn has_affordance(&self, action_identifier: &str) -> bool {
        self.affordances.iter().any(|a| a == action_identifier)
    }
}

//
// ================= Approval =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Operator explicitly answered no
    Declined,
    /// Operator input could not be interpreted as yes or no
    UnrecognizedInput,
    /// Operator interrupted the prompt or closed the input stream
    Cancelled,
    /// No decision arrived before the approval timeout
    TimedOut,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected(RejectionReason),
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved)
    }
}

//
// ================= Audit =================
//

/// Audit status vocabulary. The rendered strings are a compatibility contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    OrderVerified,
    UiStateMismatch(String),
    CancelledByHuman,
    SystemError(String),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::OrderVerified => write!(f, "SUCCESS - ORDER VERIFIED"),
            RunStatus::UiStateMismatch(observed) => {
                write!(f, "FAILURE - UI STATE MISMATCH: {}", observed)
            }
            RunStatus::CancelledByHuman => write!(f, "CANCELLED BY HUMAN"),
            RunStatus::SystemError(detail) => write!(f, "FAILURE - SYSTEM ERROR: {}", detail),
        }
    }
}

/// One audit trail entry. Written once per run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Local>,
    pub material: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub status: RunStatus,
}

impl RunEvent {
    pub fn for_record(record: &ProcurementRecord, status: RunStatus) -> Self {
        Self {
            timestamp: Local::now(),
            material: Some(record.material().to_string()),
            price: Some(record.price()),
            currency: Some(record.currency().to_string()),
            status,
        }
    }

    /// Entry for a run that failed before a record was validated
    pub fn without_record(status: RunStatus) -> Self {
        Self {
            timestamp: Local::now(),
            material: None,
            price: None,
            currency: None,
            status,
        }
    }

    /// Render as a single audit line (no trailing newline)
    pub fn to_line(&self) -> String {
        let material = self.material.as_deref().unwrap_or("N/A");
        let price = match (&self.currency, self.price) {
            (Some(currency), Some(price)) => format!("{}{}", currency, format_price(price)),
            _ => "N/A".to_string(),
        };

        // Embedded newlines would split one event across lines
        let line = format!(
            "[{}] MATERIAL: {} | PRICE: {} | STATUS: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            material,
            price,
            self.status
        );
        line.replace(['\r', '\n'], " ")
    }
}

/// Render a price the way the audit trail always has: `45.0`, `12.5`.
pub fn format_price(price: f64) -> String {
    let rendered = price.to_string();
    if price.is_finite() && !rendered.contains('.') {
        format!("{}.0", rendered)
    } else {
        rendered
    }
}

//
// ================= Run State Machine =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    Observed,
    Extracted,
    Validated,
    AwaitingApproval,
    Approved,
    Rejected,
    Executed,
    Verified,
    Mismatched,
    VerificationTimedOut,
    Failed,
    Logged,
    Done,
}

impl RunState {
    /// States after which the run only logs and finishes
    pub fn is_terminal_outcome(&self) -> bool {
        matches!(
            self,
            RunState::Rejected
                | RunState::Verified
                | RunState::Mismatched
                | RunState::VerificationTimedOut
                | RunState::Failed
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;

        if next == Failed {
            return !matches!(self, Failed | Logged | Done);
        }

        matches!(
            (self, next),
            (Init, Observed)
                | (Observed, Extracted)
                | (Extracted, Validated)
                | (Validated, AwaitingApproval)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Rejected)
                | (Approved, Executed)
                | (Executed, Verified)
                | (Executed, Mismatched)
                | (Executed, VerificationTimedOut)
                | (Rejected, Logged)
                | (Verified, Logged)
                | (Mismatched, Logged)
                | (VerificationTimedOut, Logged)
                | (Failed, Logged)
                | (Logged, Done)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "INIT",
            RunState::Observed => "OBSERVED",
            RunState::Extracted => "EXTRACTED",
            RunState::Validated => "VALIDATED",
            RunState::AwaitingApproval => "AWAITING_APPROVAL",
            RunState::Approved => "APPROVED",
            RunState::Rejected => "REJECTED",
            RunState::Executed => "EXECUTED",
            RunState::Verified => "VERIFIED",
            RunState::Mismatched => "MISMATCHED",
            RunState::VerificationTimedOut => "VERIFICATION_TIMED_OUT",
            RunState::Failed => "FAILED",
            RunState::Logged => "LOGGED",
            RunState::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Verified,
    Mismatched { observed: String },
    VerificationTimedOut { last_observed: String },
    Rejected { reason: RejectionReason },
    Failed { kind: FailureKind, message: String },
}

impl RunOutcome {
    /// Failed runs are defects; every other outcome is an expected operational result.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub states: Vec<RunState>,
    pub outcome: RunOutcome,
    pub record: Option<ProcurementRecord>,
    pub snapshot_digest: Option<String>,
    pub audit_line: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// The decisive state the run ended in, before logging
    pub fn terminal_state(&self) -> Option<RunState> {
        self.states
            .iter()
            .rev()
            .find(|s| s.is_terminal_outcome())
            .copied()
    }

    pub fn reached(&self, state: RunState) -> bool {
        self.states.contains(&state)
    }

    /// Human-readable summary for the operator
    pub fn summary(&self) -> String {
        let headline = match &self.outcome {
            RunOutcome::Verified => "SUCCESS: procurement loop closed, order verified.".to_string(),
            RunOutcome::Mismatched { observed } => format!(
                "FAILURE: affordance state did not change as expected (observed {:?}).",
                observed
            ),
            RunOutcome::VerificationTimedOut { last_observed } => format!(
                "FAILURE: affordance state never settled (last observed {:?}).",
                last_observed
            ),
            RunOutcome::Rejected { reason } => {
                format!("CANCELLED: action not approved ({:?}).", reason)
            }
            RunOutcome::Failed { kind, message } => {
                format!("SYSTEM ERROR ({:?}): {}", kind, message)
            }
        };

        let trace = self
            .states
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> ");

        format!(
            "{}\nRun:   {}\nTrace: {}\nAudit: {}",
            headline, self.run_id, trace, self.audit_line
        )
    }
}
