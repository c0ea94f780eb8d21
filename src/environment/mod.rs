//! Observer/Actuator capability
//!
//! The target surface is driven through an exclusively-owned session.
//! A session is opened at the start of a run and must be closed on every
//! exit path.

use crate::models::EnvironmentSnapshot;
use crate::Result;
use async_trait::async_trait;

pub mod fixture;
pub mod mock;

pub use fixture::FixturePageDriver;
pub use mock::MockEnvironment;

/// One live session against the target surface
#[async_trait]
pub trait EnvironmentSession: Send {
    /// Capture the current rendered state
    async fn observe(&mut self) -> Result<EnvironmentSnapshot>;

    /// Perform the action bound to an affordance (e.g. click a button)
    async fn invoke_action(&mut self, action_identifier: &str) -> Result<()>;

    /// Read the observable state/text of an affordance
    async fn read_affordance_state(&mut self, action_identifier: &str) -> Result<String>;

    /// Release the session. Called exactly once per opened session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions against a target surface
#[async_trait]
pub trait EnvironmentDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn EnvironmentSession>>;
}
