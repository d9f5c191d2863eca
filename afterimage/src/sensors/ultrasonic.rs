//! Ultrasonic distance sensor

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::strength_message;
use crate::domain::{LedSignal, Message, Payload, ServiceId, TuningConfig};
use crate::error::ServiceResult;
use crate::hardware::DistanceProbe;
use crate::service::{Service, ServiceContext};

/// Signals the display and the LED whenever someone is closer than `threshold`
pub struct UltrasonicSensor {
    id: ServiceId,
    probe: Box<dyn DistanceProbe>,
    threshold: f64,
    poll_interval: Duration,
    fallback: TuningConfig,
}

impl UltrasonicSensor {
    pub fn new(probe: Box<dyn DistanceProbe>, threshold: f64, poll_interval: Duration, fallback: TuningConfig) -> Self {
        debug!(threshold, ?poll_interval, "UltrasonicSensor::new: called");
        Self {
            id: ServiceId::ULTRASONIC,
            probe,
            threshold,
            poll_interval,
            fallback,
        }
    }
}

#[async_trait]
impl Service for UltrasonicSensor {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        self.probe.connect().await
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        let distance = self.probe.measure().await?;

        if distance < self.threshold {
            let signal = strength_message(&self.id, ctx, &self.fallback)?;
            let duration = match signal.payload() {
                Payload::Strength(s) => s.duration,
                _ => self.fallback.duration,
            };
            info!(distance, threshold = self.threshold, "Visitor in range");
            ctx.emit(signal).await?;

            let led = Message::new(
                self.id.clone(),
                Payload::Led(LedSignal {
                    distance,
                    threshold: self.threshold,
                    duration,
                }),
            )?
            .with_target(ServiceId::LED);
            ctx.emit(led).await?;
        }

        tokio::time::sleep(self.poll_interval).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Fixed(Vec<f64>);

    #[async_trait]
    impl DistanceProbe for Fixed {
        async fn measure(&mut self) -> ServiceResult<f64> {
            Ok(self.0.remove(0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_close_readings_emit() {
        let mut sensor = UltrasonicSensor::new(
            Box::new(Fixed(vec![120.0, 30.0])),
            50.0,
            Duration::from_millis(100),
            TuningConfig::default(),
        );
        let (_in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let mut ctx = ServiceContext::new(ServiceId::ULTRASONIC, in_rx, out_tx);

        sensor.step(&mut ctx).await.unwrap();
        assert!(out_rx.try_recv().is_err());

        sensor.step(&mut ctx).await.unwrap();
        let strength = out_rx.try_recv().unwrap();
        assert!(strength.payload().is_strength_signal());
        assert!(strength.target().is_none());

        let led = out_rx.try_recv().unwrap();
        assert_eq!(led.target(), Some(&ServiceId::LED));
        assert!(matches!(led.payload(), Payload::Led(s) if s.distance == 30.0 && s.threshold == 50.0));
    }
}
