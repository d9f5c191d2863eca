//! Generic task loop shared by every service
//!
//! One spawned task per service: setup once, then step until the stop token
//! fires. Errors never leave the task; they are logged here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Service, ServiceContext};
use crate::domain::ServiceId;
use crate::error::{ServiceError, ServiceResult};

/// Pause after a failed step before trying again
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// How a service task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stop token fired
    Stopped,
    /// `setup` failed; the step loop never ran
    StartupFailed(String),
    /// A fatal step error ended the loop
    Failed(String),
}

/// Owner's handle on a running service task
pub struct ServiceHandle {
    id: ServiceId,
    service: Arc<Mutex<Box<dyn Service>>>,
    task: Option<JoinHandle<RunOutcome>>,
}

impl ServiceHandle {
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Wait for the task to finish
    ///
    /// On expiry the task is aborted so that [`cleanup`](Self::cleanup) can
    /// still reach the service.
    pub async fn join(&mut self, timeout: Duration) -> ServiceResult<RunOutcome> {
        debug!(service = %self.id, ?timeout, "ServiceHandle::join: called");
        let Some(mut task) = self.task.take() else {
            debug!(service = %self.id, "ServiceHandle::join: already joined");
            return Ok(RunOutcome::Stopped);
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                error!(service = %self.id, error = %e, "Service task panicked");
                Ok(RunOutcome::Failed(e.to_string()))
            }
            Err(_) => {
                task.abort();
                let _ = task.await;
                Err(ServiceError::ShutdownTimeout {
                    service: self.id.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Release the service's devices
    ///
    /// Only call after [`join`](Self::join); the running task holds the lock.
    pub async fn cleanup(&self) -> ServiceResult<()> {
        debug!(service = %self.id, "ServiceHandle::cleanup: called");
        let mut service = self.service.lock().await;
        service.cleanup().await
    }
}

/// Spawn the setup/step loop for `service`
pub fn spawn_service(
    service: Box<dyn Service>,
    ctx: ServiceContext,
    stop: CancellationToken,
    backoff: Duration,
) -> ServiceHandle {
    let id = service.id().clone();
    debug!(service = %id, "spawn_service: called");
    let service = Arc::new(Mutex::new(service));
    let task = tokio::spawn(run_service(service.clone(), ctx, stop, backoff));
    ServiceHandle {
        id,
        service,
        task: Some(task),
    }
}

async fn run_service(
    service: Arc<Mutex<Box<dyn Service>>>,
    mut ctx: ServiceContext,
    stop: CancellationToken,
    backoff: Duration,
) -> RunOutcome {
    let mut service = service.lock().await;
    let id = service.id().clone();

    if let Err(e) = service.setup().await {
        let err = ServiceError::startup(&id, &e);
        error!(service = %id, error = %err, "Service setup failed, not starting");
        return RunOutcome::StartupFailed(e.to_string());
    }
    info!(service = %id, "Service started");

    loop {
        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!(service = %id, "run_service: stop requested");
                break;
            }
            result = service.step(&mut ctx) => result,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_control_signal() => {
                debug!(service = %id, "run_service: step idle");
            }
            Err(e) if e.is_fatal() => {
                error!(service = %id, error = %e, "Fatal step error, stopping service");
                return RunOutcome::Failed(e.to_string());
            }
            Err(e) => {
                error!(service = %id, error = %e, "Step failed, continuing");
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    info!(service = %id, "Service stopped");
    RunOutcome::Stopped
}
