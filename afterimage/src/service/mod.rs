//! Service lifecycle
//!
//! Every sensor and actuator implements [`Service`]. The shared task loop in
//! [`spawn_service`] drives it; nothing about start/stop lives in the devices.

mod context;
mod runner;

use async_trait::async_trait;

pub use context::ServiceContext;
pub use runner::{DEFAULT_ERROR_BACKOFF, RunOutcome, ServiceHandle, spawn_service};

use crate::domain::ServiceId;
use crate::error::ServiceResult;

/// A sensor or actuator driven by the service runner
#[async_trait]
pub trait Service: Send {
    fn id(&self) -> &ServiceId;

    /// Acquire devices; a failure keeps the step loop from starting
    async fn setup(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    /// One unit of work, called repeatedly until stop
    ///
    /// Must be cancel-safe: the runner drops the future when stop fires.
    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()>;

    /// Release devices; runs once after the task has ended
    async fn cleanup(&mut self) -> ServiceResult<()> {
        Ok(())
    }
}
