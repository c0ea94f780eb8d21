//! Procurement Agent Orchestrator
//!
//! A human-supervised automation agent that:
//! - Observes the rendered state of a target surface
//! - Asks a generative model for a structured action proposal
//! - Validates the proposal against a strict schema
//! - Requires explicit human approval before any side effect
//! - Executes the approved action and independently verifies the result
//! - Records every run in an append-only audit trail
//!
//! UNIFIED LOOP:
//! OBSERVE → EXTRACT → VALIDATE → APPROVE → ACT → VERIFY → AUDIT

pub mod agent;
pub mod approval;
pub mod audit;
pub mod config;
pub mod environment;
pub mod error;
pub mod execution;
pub mod extraction;
pub mod models;
pub mod validation;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use config::AgentConfig;
