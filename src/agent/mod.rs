//! Main orchestrator - owns the run state machine
//!
//! OBSERVE → EXTRACT → VALIDATE → APPROVE → ACT → VERIFY → AUDIT
//!
//! The orchestrator is the only component with lifecycle authority: it opens
//! the environment session, sequences every stage, guarantees the session is
//! closed on every exit path, and writes exactly one audit entry per run.

use crate::approval::{ApprovalGate, OperatorInterrupt};
use crate::audit::{compute_snapshot_digest, AuditSink};
use crate::environment::{EnvironmentDriver, EnvironmentSession};
use crate::error::OrchestrationError;
use crate::execution::ActionExecutor;
use crate::extraction::ExtractionEngine;
use crate::models::{
    ApprovalDecision, ProcurementRecord, RunEvent, RunOutcome, RunReport, RunState, RunStatus,
};
use crate::validation::SchemaValidator;
use crate::verification::{ExpectedState, VerificationOutcome, Verifier};
use crate::Result;
use chrono::Utc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Ordered record of the states a run passed through
struct RunTracker {
    run_id: Uuid,
    states: Vec<RunState>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            states: vec![RunState::Init],
        }
    }

    fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Init)
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(OrchestrationError::SystemError(format!(
                "illegal state transition {} -> {}",
                current, next
            )));
        }

        debug!(run_id = %self.run_id, from = %current, to = %next, "State transition");
        self.states.push(next);
        Ok(())
    }
}

/// What the run has established so far, for the audit entry
#[derive(Default)]
struct RunProgress {
    record: Option<ProcurementRecord>,
    snapshot_digest: Option<String>,
}

/// Main orchestrator that coordinates one supervised run
pub struct Orchestrator {
    driver: Box<dyn EnvironmentDriver>,
    extraction_engine: ExtractionEngine,
    approval_gate: Box<dyn ApprovalGate>,
    executor: ActionExecutor,
    verifier: Verifier,
    expected_state: ExpectedState,
    audit_log: Box<dyn AuditSink>,
    interrupt: Option<OperatorInterrupt>,
    active_run: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        driver: Box<dyn EnvironmentDriver>,
        extraction_engine: ExtractionEngine,
        approval_gate: Box<dyn ApprovalGate>,
        executor: ActionExecutor,
        verifier: Verifier,
        expected_state: ExpectedState,
        audit_log: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            driver,
            extraction_engine,
            approval_gate,
            executor,
            verifier,
            expected_state,
            audit_log,
            interrupt: None,
            active_run: Mutex::new(()),
        }
    }

    /// Stop the active run on operator interrupt. The session is still
    /// closed and the run is audited as a system error.
    pub fn with_interrupt(mut self, interrupt: OperatorInterrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Run one observe → audit cycle.
    ///
    /// Rejections, mismatches and stage failures are all reported through the
    /// returned [`RunReport`]. `Err` is reserved for a refused start (another
    /// run is active) and for an audit entry that could not be written.
    pub async fn run(&self) -> Result<RunReport> {
        let _active = self
            .active_run
            .try_lock()
            .map_err(|_| OrchestrationError::RunInProgress)?;

        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut tracker = RunTracker::new();
        let mut progress = RunProgress::default();

        info!(run_id = %tracker.run_id, "Orchestrator: starting run");

        let result = match self.driver.open().await {
            Ok(mut session) => {
                let run_id = tracker.run_id;
                let result = match &self.interrupt {
                    Some(interrupt) => tokio::select! {
                        result = self.drive(session.as_mut(), &mut tracker, &mut progress) => result,
                        _ = interrupt.run_interrupted() => {
                            warn!(run_id = %run_id, "Run interrupted by operator");
                            Err(OrchestrationError::SystemError(
                                "run interrupted by operator".to_string(),
                            ))
                        }
                    },
                    None => {
                        self.drive(session.as_mut(), &mut tracker, &mut progress)
                            .await
                    }
                };

                // Released on every path, including stage failures
                if let Err(e) = session.close().await {
                    warn!(run_id = %tracker.run_id, error = %e, "Failed to close environment session");
                }

                result
            }
            Err(e) => Err(e),
        };

        self.finish(tracker, progress, result, started_at, start_time)
            .await
    }

    async fn drive(
        &self,
        session: &mut dyn EnvironmentSession,
        tracker: &mut RunTracker,
        progress: &mut RunProgress,
    ) -> Result<RunOutcome> {
        // === OBSERVE ===
        let snapshot = session.observe().await?;
        tracker.advance(RunState::Observed)?;

        let digest = compute_snapshot_digest(&snapshot);
        debug!(
            run_id = %tracker.run_id,
            snapshot_digest = %digest,
            affordances = ?snapshot.affordances,
            "Environment observed"
        );
        progress.snapshot_digest = Some(digest);

        // === EXTRACT ===
        let raw = self.extraction_engine.extract(&snapshot).await?;
        tracker.advance(RunState::Extracted)?;

        // === VALIDATE ===
        let record = SchemaValidator::validate_for_snapshot(&raw, &snapshot).map_err(|violation| {
            warn!(run_id = %tracker.run_id, %violation, "Proposal failed validation");
            OrchestrationError::ValidationError(violation)
        })?;
        tracker.advance(RunState::Validated)?;
        progress.record = Some(record.clone());

        info!(
            run_id = %tracker.run_id,
            material = record.material(),
            price = record.price(),
            currency = record.currency(),
            action_identifier = record.action_identifier(),
            "Proposal validated"
        );

        // === APPROVE ===
        tracker.advance(RunState::AwaitingApproval)?;
        let decision = self.approval_gate.request_approval(&record).await?;

        if let ApprovalDecision::Rejected(reason) = decision {
            tracker.advance(RunState::Rejected)?;
            info!(run_id = %tracker.run_id, ?reason, "Action rejected by operator");
            return Ok(RunOutcome::Rejected { reason });
        }
        tracker.advance(RunState::Approved)?;

        // === ACT ===
        let action = self.executor.execute(session, &record, decision).await?;
        tracker.advance(RunState::Executed)?;

        info!(
            run_id = %tracker.run_id,
            action_identifier = %action.action_identifier,
            execution_time_ms = action.execution_time_ms,
            "Action executed"
        );

        // === VERIFY ===
        let outcome = match self
            .verifier
            .verify(session, &record, &self.expected_state)
            .await?
        {
            VerificationOutcome::Verified => {
                tracker.advance(RunState::Verified)?;
                RunOutcome::Verified
            }
            VerificationOutcome::Mismatched { observed } => {
                tracker.advance(RunState::Mismatched)?;
                RunOutcome::Mismatched { observed }
            }
            VerificationOutcome::TimedOut { last_observed } => {
                tracker.advance(RunState::VerificationTimedOut)?;
                RunOutcome::VerificationTimedOut { last_observed }
            }
        };

        Ok(outcome)
    }

    /// Write the single audit entry and close out the state machine
    async fn finish(
        &self,
        mut tracker: RunTracker,
        progress: RunProgress,
        result: Result<RunOutcome>,
        started_at: chrono::DateTime<Utc>,
        start_time: Instant,
    ) -> Result<RunReport> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    run_id = %tracker.run_id,
                    state = %tracker.current(),
                    kind = ?e.kind(),
                    error = %e,
                    "Run failed"
                );
                tracker.advance(RunState::Failed)?;
                RunOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        let status = match &outcome {
            RunOutcome::Verified => RunStatus::OrderVerified,
            RunOutcome::Mismatched { observed } => RunStatus::UiStateMismatch(observed.clone()),
            RunOutcome::VerificationTimedOut { last_observed } => {
                RunStatus::UiStateMismatch(last_observed.clone())
            }
            RunOutcome::Rejected { .. } => RunStatus::CancelledByHuman,
            RunOutcome::Failed { message, .. } => RunStatus::SystemError(message.clone()),
        };

        let event = match &progress.record {
            Some(record) => RunEvent::for_record(record, status),
            None => RunEvent::without_record(status),
        };

        let audit_line = self.audit_log.append(&event).await.map_err(|e| {
            error!(run_id = %tracker.run_id, error = %e, "Audit entry could not be written");
            e
        })?;
        tracker.advance(RunState::Logged)?;
        tracker.advance(RunState::Done)?;

        info!(
            run_id = %tracker.run_id,
            outcome = ?outcome,
            "Run complete"
        );

        Ok(RunReport {
            run_id: tracker.run_id,
            states: tracker.states,
            outcome,
            record: progress.record,
            snapshot_digest: progress.snapshot_digest,
            audit_line,
            started_at,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ScriptedApprovalGate;
    use crate::audit::InMemoryAuditLog;
    use crate::environment::MockEnvironment;
    use crate::extraction::MockExtractionService;
    use crate::verification::VerificationPolicy;
    use std::time::Duration;

    #[test]
    fn test_tracker_rejects_illegal_transition() {
        let mut tracker = RunTracker::new();
        assert!(tracker.advance(RunState::Observed).is_ok());
        assert!(tracker.advance(RunState::Executed).is_err());
        assert_eq!(tracker.current(), RunState::Observed);
    }

    #[tokio::test]
    async fn test_orchestrator_run() {
        let env = MockEnvironment::new("<button id=\"quoteBtn\">Request Quote</button>")
            .with_affordance("quoteBtn", "Request Quote")
            .with_after_click("quoteBtn", &["Quote Sent!"]);
        let audit_log = InMemoryAuditLog::new();

        let orchestrator = Orchestrator::new(
            Box::new(env.clone()),
            ExtractionEngine::new(Box::new(MockExtractionService::responding(
                r#"{"material":"Steel Rod","price":45.0,"currency":"USD","actionIdentifier":"quoteBtn"}"#,
            ))),
            Box::new(ScriptedApprovalGate::approving()),
            ActionExecutor::new(),
            Verifier::new(VerificationPolicy::single_sample(Duration::ZERO)),
            ExpectedState::new("Quote Sent!"),
            Box::new(audit_log.clone()),
        );

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Verified);
        assert_eq!(report.states.first(), Some(&RunState::Init));
        assert_eq!(report.states.last(), Some(&RunState::Done));
        assert!(report.snapshot_digest.is_some());
        assert_eq!(audit_log.len().await, 1);
        assert_eq!(env.closed(), 1);
    }
}
