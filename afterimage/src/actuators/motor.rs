//! Vibration motor actuator

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::IDLE_WINDOW;
use crate::domain::{Payload, ServiceId};
use crate::error::{ServiceError, ServiceResult};
use crate::hardware::PwmOutput;
use crate::service::{Service, ServiceContext};

/// Runs the motor at a pulse's intensity for the pulse's duration
pub struct VibrationMotor {
    id: ServiceId,
    pwm: Box<dyn PwmOutput>,
}

impl VibrationMotor {
    pub fn new(pwm: Box<dyn PwmOutput>) -> Self {
        Self {
            id: ServiceId::VIBRATION_MOTOR,
            pwm,
        }
    }
}

#[async_trait]
impl Service for VibrationMotor {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        self.pwm.set_duty(0.0)
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        let Some(message) = ctx.recv_timeout(IDLE_WINDOW).await? else {
            return Err(ServiceError::ChannelClosed {
                target: self.id.to_string(),
            });
        };

        let Payload::Pulse(pulse) = message.payload() else {
            warn!(origin = %message.origin(), kind = message.payload().kind(), "Motor ignoring non-pulse message");
            return Ok(());
        };

        info!(intensity = pulse.intensity, duration = pulse.duration, "Vibrating");
        self.pwm.set_duty(pulse.intensity)?;
        tokio::time::sleep(Duration::try_from_secs_f64(pulse.duration).unwrap_or_default()).await;
        self.pwm.set_duty(0.0)?;
        debug!("VibrationMotor::step: pulse done");
        Ok(())
    }

    async fn cleanup(&mut self) -> ServiceResult<()> {
        debug!("VibrationMotor::cleanup: called");
        self.pwm.set_duty(0.0)
    }
}
