//! Service error types
//!
//! Every per-task failure is one of these. None of them propagate past the
//! task boundary: runners and routers log them and keep going.

use std::time::Duration;

use thiserror::Error;

use crate::domain::ServiceId;

/// Errors raised inside services, routers and the channel layer
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel to {target} is full, message dropped")]
    ChannelFull { target: String },

    #[error("Channel to {target} is closed")]
    ChannelClosed { target: String },

    #[error("No message within {0:?}")]
    ReceiveTimeout(Duration),

    #[error("Unknown service: {0}")]
    UnknownService(ServiceId),

    #[error("Startup of {service} failed: {reason}")]
    StartupFailure { service: ServiceId, reason: String },

    #[error("{service} did not stop within {timeout:?}")]
    ShutdownTimeout { service: String, timeout: Duration },

    #[error("Device error: {0}")]
    Device(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience alias used across the service layer
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Device loss stops the owning service; everything else is retried on the next step
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::Device(_) | ServiceError::ChannelClosed { .. })
    }

    /// Receive timeouts drive de-escalation and are not failures
    pub fn is_control_signal(&self) -> bool {
        matches!(self, ServiceError::ReceiveTimeout(_))
    }

    /// Build a `StartupFailure` from any displayable cause
    pub fn startup(service: &ServiceId, reason: impl std::fmt::Display) -> Self {
        ServiceError::StartupFailure {
            service: service.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServiceError::ChannelFull {
            target: "image-display".to_string(),
        };
        assert_eq!(err.to_string(), "Channel to image-display is full, message dropped");

        let err = ServiceError::startup(&ServiceId::TOUCH, "device not found");
        assert_eq!(err.to_string(), "Startup of touch-sensor failed: device not found");
    }

    #[test]
    fn test_is_fatal() {
        assert!(ServiceError::Device("unplugged".to_string()).is_fatal());
        assert!(
            ServiceError::ChannelClosed {
                target: "led".to_string()
            }
            .is_fatal()
        );
        assert!(!ServiceError::InvalidMessage("empty origin".to_string()).is_fatal());
        assert!(!ServiceError::ReceiveTimeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_receive_timeout_is_control_signal() {
        assert!(ServiceError::ReceiveTimeout(Duration::from_secs(30)).is_control_signal());
        assert!(!ServiceError::UnknownService(ServiceId::LED).is_control_signal());
    }
}
