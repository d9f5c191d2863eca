//! Face presence sensor

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::strength_message;
use crate::domain::{ServiceId, TuningConfig};
use crate::error::ServiceResult;
use crate::hardware::FaceDetector;
use crate::service::{Service, ServiceContext};

pub struct FaceSensor {
    id: ServiceId,
    detector: Box<dyn FaceDetector>,
    poll_interval: Duration,
    fallback: TuningConfig,
}

impl FaceSensor {
    pub fn new(detector: Box<dyn FaceDetector>, poll_interval: Duration, fallback: TuningConfig) -> Self {
        Self {
            id: ServiceId::FACE_RECOGNITION,
            detector,
            poll_interval,
            fallback,
        }
    }
}

#[async_trait]
impl Service for FaceSensor {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        self.detector.connect().await
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        let faces = self.detector.detect().await?;
        if faces > 0 {
            info!(faces, "Faces detected");
            let signal = strength_message(&self.id, ctx, &self.fallback)?;
            ctx.emit(signal).await?;
        }
        tokio::time::sleep(self.poll_interval).await;
        Ok(())
    }
}
