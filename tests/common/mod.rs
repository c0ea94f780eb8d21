//! Shared harness for orchestrator integration tests

use procurement_agent::agent::Orchestrator;
use procurement_agent::approval::ApprovalGate;
use procurement_agent::audit::InMemoryAuditLog;
use procurement_agent::environment::MockEnvironment;
use procurement_agent::execution::ActionExecutor;
use procurement_agent::extraction::{ExtractionEngine, MockExtractionService};
use procurement_agent::verification::{ExpectedState, VerificationPolicy, Verifier};
use std::time::Duration;

pub const VENDOR_PAGE: &str = r#"<html><body>
<div class="listing"><span id="material">Steel Rod</span><span id="price">$45.00</span><span>USD</span></div>
<button id="quoteBtn">Request Quote</button>
</body></html>"#;

pub const STEEL_ROD_PROPOSAL: &str =
    r#"{"material":"Steel Rod","price":45.0,"currency":"USD","actionIdentifier":"quoteBtn"}"#;

pub const EXPECTED: &str = "Quote Sent!";

/// Vendor page whose quote button shows `after_click` states once pressed
pub fn vendor_page(after_click: &[&str]) -> MockEnvironment {
    MockEnvironment::new(VENDOR_PAGE)
        .with_affordance("material", "Steel Rod")
        .with_affordance("price", "$45.00")
        .with_affordance("quoteBtn", "Request Quote")
        .with_after_click("quoteBtn", after_click)
}

pub fn fast_polling() -> VerificationPolicy {
    VerificationPolicy {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::ZERO,
        max_attempts: 5,
        stable_samples: 3,
    }
}

pub fn orchestrator(
    env: &MockEnvironment,
    extraction_response: &str,
    gate: impl ApprovalGate + 'static,
    policy: VerificationPolicy,
) -> (Orchestrator, InMemoryAuditLog) {
    let audit_log = InMemoryAuditLog::new();

    let orchestrator = Orchestrator::new(
        Box::new(env.clone()),
        ExtractionEngine::new(Box::new(MockExtractionService::responding(
            extraction_response,
        ))),
        Box::new(gate),
        ActionExecutor::new(),
        Verifier::new(policy),
        ExpectedState::new(EXPECTED),
        Box::new(audit_log.clone()),
    );

    (orchestrator, audit_log)
}
