use procurement_agent::{
    agent::Orchestrator,
    approval::{ConsoleApprovalGate, OperatorInterrupt},
    audit::FileAuditLog,
    config::AgentConfig,
    environment::FixturePageDriver,
    execution::ActionExecutor,
    extraction::{ExtractionEngine, OllamaClient},
    verification::Verifier,
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing (stderr, so prompts on stdout stay readable)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Procurement agent could not start");
            eprintln!("System error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> procurement_agent::Result<ExitCode> {
    let config = AgentConfig::from_env()?;

    info!("Procurement Agent starting");

    // Create components
    let interrupt = OperatorInterrupt::new();
    let driver = FixturePageDriver::new(&config.target_page);
    let extractor = OllamaClient::new(
        &config.ollama_base_url,
        &config.model,
        config.extraction_timeout,
    )?;
    let approval_gate = ConsoleApprovalGate::stdio(config.unrecognized_input)
        .with_timeout(config.approval_timeout)
        .with_interrupt(interrupt.clone());
    let verifier = Verifier::new(config.verification.clone());
    let audit_log = FileAuditLog::new(&config.audit_log_path);

    info!(
        target_page = %driver.path().display(),
        model = extractor.model(),
        audit_log = %audit_log.path().display(),
        settle_delay_ms = verifier.policy().settle_delay.as_millis() as u64,
        max_attempts = verifier.policy().max_attempts,
        "Configuration loaded"
    );

    // Create orchestrator
    let orchestrator = Orchestrator::new(
        Box::new(driver),
        ExtractionEngine::new(Box::new(extractor)),
        Box::new(approval_gate),
        ActionExecutor::new(),
        verifier,
        config.expected_state.clone(),
        Box::new(audit_log),
    )
    .with_interrupt(interrupt.clone());

    forward_interrupts(interrupt);

    println!("\nAgent: analyzing vendor portal...");

    let report = orchestrator.run().await?;

    println!("\n=== RUN RESULT ===");
    println!("{}", report.summary());

    // Rejections and mismatches are expected outcomes, not process failures
    if report.outcome.is_failure() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Route Ctrl-C to the approval prompt or the active run
fn forward_interrupts(interrupt: OperatorInterrupt) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                return;
            }
            interrupt.trigger();
        }
    });
}
