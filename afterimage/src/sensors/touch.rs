//! Touch screen sensor

use async_trait::async_trait;
use tracing::{debug, info};

use super::strength_message;
use crate::domain::{ServiceId, TuningConfig};
use crate::error::ServiceResult;
use crate::hardware::{TouchEvent, TouchInput};
use crate::service::{Service, ServiceContext};

/// Touch-down restores the image; moves and lifts are only logged
pub struct TouchSensor {
    id: ServiceId,
    input: Box<dyn TouchInput>,
    fallback: TuningConfig,
}

impl TouchSensor {
    pub fn new(input: Box<dyn TouchInput>, fallback: TuningConfig) -> Self {
        Self {
            id: ServiceId::TOUCH,
            input,
            fallback,
        }
    }
}

#[async_trait]
impl Service for TouchSensor {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        self.input.connect().await
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        match self.input.next_event().await? {
            TouchEvent::Down { x, y } => {
                info!(x, y, "Touch down");
                let signal = strength_message(&self.id, ctx, &self.fallback)?;
                ctx.emit(signal).await?;
            }
            TouchEvent::Move { x, y } => debug!(x, y, "TouchSensor::step: position"),
            TouchEvent::Up => debug!("TouchSensor::step: touch up"),
        }
        Ok(())
    }
}
