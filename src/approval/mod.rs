//! Human approval gate
//!
//! The single intentional suspension point in front of a real-world side
//! effect. Decisions are data so the orchestrator can be driven by a test
//! double instead of a terminal.

use crate::error::OrchestrationError;
use crate::models::{format_price, ApprovalDecision, ProcurementRecord, RejectionReason};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

/// Trait for obtaining a human decision on a validated record
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(&self, record: &ProcurementRecord) -> Result<ApprovalDecision>;
}

/// What to do with an answer that is neither yes nor no
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnrecognizedInputPolicy {
    /// Treat it as a rejection immediately
    Reject,
    /// Ask again, up to `max_attempts` prompts in total
    Reprompt { max_attempts: u32 },
}

impl Default for UnrecognizedInputPolicy {
    fn default() -> Self {
        UnrecognizedInputPolicy::Reprompt { max_attempts: 3 }
    }
}

impl FromStr for UnrecognizedInputPolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(UnrecognizedInputPolicy::Reject),
            "reprompt" => Ok(UnrecognizedInputPolicy::default()),
            other => Err(OrchestrationError::ConfigError(format!(
                "unknown unrecognized-input policy '{}' (expected 'reject' or 'reprompt')",
                other
            ))),
        }
    }
}

/// Operator interrupt (Ctrl-C) shared by the signal listener, the approval
/// prompt and the orchestrator.
///
/// While a prompt is open an interrupt cancels the prompt; otherwise it
/// interrupts the active run.
#[derive(Clone, Default)]
pub struct OperatorInterrupt {
    inner: Arc<InterruptState>,
}

#[derive(Default)]
struct InterruptState {
    prompting: AtomicBool,
    prompt: Notify,
    run: Notify,
}

impl OperatorInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if self.inner.prompting.load(Ordering::SeqCst) {
            self.inner.prompt.notify_one();
        } else {
            self.inner.run.notify_one();
        }
    }

    /// Resolves on an interrupt delivered outside an approval prompt
    pub async fn run_interrupted(&self) {
        self.inner.run.notified().await
    }

    fn begin_prompt(&self) -> PromptGuard<'_> {
        self.inner.prompting.store(true, Ordering::SeqCst);
        PromptGuard(&self.inner)
    }

    async fn prompt_interrupted(&self) {
        self.inner.prompt.notified().await
    }
}

struct PromptGuard<'a>(&'a InterruptState);

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.0.prompting.store(false, Ordering::SeqCst);
    }
}

/// Interpret an operator answer. `None` means unrecognized.
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Interactive terminal gate
pub struct ConsoleApprovalGate<R, W> {
    io: Mutex<(R, W)>,
    policy: UnrecognizedInputPolicy,
    timeout: Option<Duration>,
    interrupt: Option<OperatorInterrupt>,
}

impl ConsoleApprovalGate<BufReader<Stdin>, Stdout> {
    /// Gate bound to the process terminal
    pub fn stdio(policy: UnrecognizedInputPolicy) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), policy)
    }
}

impl<R, W> ConsoleApprovalGate<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, policy: UnrecognizedInputPolicy) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
            policy,
            timeout: None,
            interrupt: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// An interrupt during the prompt cancels it
    pub fn with_interrupt(mut self, interrupt: OperatorInterrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

#[async_trait]
impl<R, W> ApprovalGate for ConsoleApprovalGate<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request_approval(&self, record: &ProcurementRecord) -> Result<ApprovalDecision> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        writer.write_all(render_request(record).as_bytes()).await?;

        let interrupt = self.interrupt.clone();
        let policy = self.policy;
        let prompt = async move {
            match interrupt {
                Some(interrupt) => {
                    let _prompting = interrupt.begin_prompt();
                    tokio::select! {
                        decision = prompt_until_decided(reader, writer, policy) => decision,
                        _ = interrupt.prompt_interrupted() => {
                            warn!("Approval prompt interrupted by operator");
                            Ok(ApprovalDecision::Rejected(RejectionReason::Cancelled))
                        }
                    }
                }
                None => prompt_until_decided(reader, writer, policy).await,
            }
        };

        let decision = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, prompt).await {
                Ok(decision) => decision?,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Approval timed out");
                    ApprovalDecision::Rejected(RejectionReason::TimedOut)
                }
            },
            None => prompt.await?,
        };

        info!(
            action_identifier = record.action_identifier(),
            decision = ?decision,
            "Approval decision received"
        );

        Ok(decision)
    }
}

fn render_request(record: &ProcurementRecord) -> String {
    format!(
        "\n--- HUMAN APPROVAL REQUIRED ---\n\
         Material: {}\n\
         Price:    {} {}\n\
         Action:   Invoke '{}'\n\
         -------------------------------\n",
        record.material(),
        record.currency(),
        format_price(record.price()),
        record.action_identifier()
    )
}

async fn prompt_until_decided<R, W>(
    reader: &mut R,
    writer: &mut W,
    policy: UnrecognizedInputPolicy,
) -> Result<ApprovalDecision>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let max_attempts = match policy {
        UnrecognizedInputPolicy::Reject => 1,
        UnrecognizedInputPolicy::Reprompt { max_attempts } => max_attempts.max(1),
    };

    for attempt in 1..=max_attempts {
        writer.write_all(b"Confirm this order? (y/n): ").await?;
        writer.flush().await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            // Operator closed the input stream
            return Ok(ApprovalDecision::Rejected(RejectionReason::Cancelled));
        }

        match parse_answer(&line) {
            Some(true) => return Ok(ApprovalDecision::Approved),
            Some(false) => return Ok(ApprovalDecision::Rejected(RejectionReason::Declined)),
            None => {
                warn!(attempt, max_attempts, input = %line.trim(), "Unrecognized approval input");
                if attempt < max_attempts {
                    writer.write_all(b"Please answer 'y' or 'n'.\n").await?;
                }
            }
        }
    }

    Ok(ApprovalDecision::Rejected(RejectionReason::UnrecognizedInput))
}

/// Canned decisions for testing. Clones share the script.
#[derive(Clone, Default)]
pub struct ScriptedApprovalGate {
    decisions: Arc<std::sync::Mutex<VecDeque<ApprovalDecision>>>,
    presented: Arc<std::sync::Mutex<Vec<ProcurementRecord>>>,
}

impl ScriptedApprovalGate {
    pub fn new(decisions: impl IntoIterator<Item = ApprovalDecision>) -> Self {
        Self {
            decisions: Arc::new(std::sync::Mutex::new(decisions.into_iter().collect())),
            presented: Arc::default(),
        }
    }

    pub fn approving() -> Self {
        Self::new([ApprovalDecision::Approved])
    }

    pub fn declining() -> Self {
        Self::new([ApprovalDecision::Rejected(RejectionReason::Declined)])
    }

    /// Records shown to the "operator", in order
    pub fn presented(&self) -> Vec<ProcurementRecord> {
        self.presented
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedApprovalGate {
    async fn request_approval(&self, record: &ProcurementRecord) -> Result<ApprovalDecision> {
        if let Ok(mut presented) = self.presented.lock() {
            presented.push(record.clone());
        }

        self.decisions
            .lock()
            .map_err(|_| OrchestrationError::ApprovalError("script poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| OrchestrationError::ApprovalError("no scripted decision left".to_string()))
    }
}
