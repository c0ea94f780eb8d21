//! Scripted environment for development & testing
//! Keeps the loop runnable without a real browser

use super::{EnvironmentDriver, EnvironmentSession};
use crate::error::OrchestrationError;
use crate::models::EnvironmentSnapshot;
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    content: String,
    order: Vec<String>,
    states: HashMap<String, String>,
    after_click: HashMap<String, VecDeque<String>>,
    invoked: Vec<String>,
    reads: usize,
    opened: usize,
    closed: usize,
    fail_observe: bool,
    fail_invoke: bool,
}

/// In-memory surface with scripted post-action states.
///
/// Cloning shares the underlying state so tests can inspect what the
/// orchestrator did after handing it a clone.
#[derive(Clone, Default)]
pub struct MockEnvironment {
    state: Arc<Mutex<MockState>>,
}

impl MockEnvironment {
    pub fn new(content: impl Into<String>) -> Self {
        let env = Self::default();
        env.lock().content = content.into();
        env
    }

    /// Add an affordance with its initial state
    pub fn with_affordance(self, action_identifier: &str, initial_state: &str) -> Self {
        {
            let mut state = self.lock();
            state.order.push(action_identifier.to_string());
            state
                .states
                .insert(action_identifier.to_string(), initial_state.to_string());
        }
        self
    }

    /// States reported by successive reads after the affordance is invoked.
    /// The last state repeats once the script is exhausted.
    pub fn with_after_click(self, action_identifier: &str, states: &[&str]) -> Self {
        self.lock().after_click.insert(
            action_identifier.to_string(),
            states.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn failing_observe(self) -> Self {
        self.lock().fail_observe = true;
        self
    }

    pub fn failing_invoke(self) -> Self {
        self.lock().fail_invoke = true;
        self
    }

    pub fn invoked(&self) -> Vec<String> {
        self.lock().invoked.clone()
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EnvironmentDriver for MockEnvironment {
    async fn open(&self) -> Result<Box<dyn EnvironmentSession>> {
        self.lock().opened += 1;
        Ok(Box::new(MockSession { env: self.clone() }))
    }
}

struct MockSession {
    env: MockEnvironment,
}

#[async_trait]
impl EnvironmentSession for MockSession {
    async fn observe(&mut self) -> Result<EnvironmentSnapshot> {
        let state = self.env.lock();
        if state.fail_observe {
            return Err(OrchestrationError::SessionError(
                "mock observer unavailable".to_string(),
            ));
        }
        Ok(EnvironmentSnapshot::new(
            state.content.clone(),
            state.order.clone(),
        ))
    }

    async fn invoke_action(&mut self, action_identifier: &str) -> Result<()> {
        let mut state = self.env.lock();
        if state.fail_invoke {
            return Err(OrchestrationError::ExecutionError(format!(
                "mock actuator failed on '{}'",
                action_identifier
            )));
        }
        if !state.states.contains_key(action_identifier) {
            return Err(OrchestrationError::ExecutionError(format!(
                "affordance '{}' not found",
                action_identifier
            )));
        }
        state.invoked.push(action_identifier.to_string());
        Ok(())
    }

    async fn read_affordance_state(&mut self, action_identifier: &str) -> Result<String> {
        let mut state = self.env.lock();
        state.reads += 1;

        let clicked = state.invoked.iter().any(|a| a == action_identifier);
        if clicked {
            if let Some(script) = state.after_click.get_mut(action_identifier) {
                if script.len() > 1 {
                    if let Some(next) = script.pop_front() {
                        return Ok(next);
                    }
                }
                if let Some(last) = script.front() {
                    return Ok(last.clone());
                }
            }
        }

        state.states.get(action_identifier).cloned().ok_or_else(|| {
            OrchestrationError::ExecutionError(format!(
                "affordance '{}' not found",
                action_identifier
            ))
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.env.lock().closed += 1;
        Ok(())
    }
}
