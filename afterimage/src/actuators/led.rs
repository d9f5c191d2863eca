//! RGB LED proximity indicator
//!
//! Idle colour is white. A proximity signal shows a colour that runs from
//! white at the threshold distance to full red at zero distance, held for the
//! signal's duration.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::IDLE_WINDOW;
use crate::domain::{Payload, ServiceId};
use crate::error::{ServiceError, ServiceResult};
use crate::hardware::{Color, RgbOutput};
use crate::service::{Service, ServiceContext};

/// Colour for a visitor at `distance` when signals start at `threshold`
pub fn proximity_color(distance: f64, threshold: f64) -> Color {
    let factor = if threshold > 0.0 {
        (distance / threshold).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let fade = (factor * 255.0).round() as u8;
    Color {
        r: 255,
        g: fade,
        b: fade,
    }
}

pub struct LedIndicator {
    id: ServiceId,
    rgb: Box<dyn RgbOutput>,
}

impl LedIndicator {
    pub fn new(rgb: Box<dyn RgbOutput>) -> Self {
        Self { id: ServiceId::LED, rgb }
    }
}

#[async_trait]
impl Service for LedIndicator {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        self.rgb.set_color(Color::WHITE)
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        let Some(message) = ctx.recv_timeout(IDLE_WINDOW).await? else {
            return Err(ServiceError::ChannelClosed {
                target: self.id.to_string(),
            });
        };

        let Payload::Led(signal) = message.payload() else {
            warn!(origin = %message.origin(), kind = message.payload().kind(), "LED ignoring message");
            return Ok(());
        };

        let color = proximity_color(signal.distance, signal.threshold);
        debug!(distance = signal.distance, ?color, "LedIndicator::step: showing proximity");
        self.rgb.set_color(color)?;
        tokio::time::sleep(Duration::try_from_secs_f64(signal.duration).unwrap_or_default()).await;
        self.rgb.set_color(Color::WHITE)
    }

    async fn cleanup(&mut self) -> ServiceResult<()> {
        debug!("LedIndicator::cleanup: called");
        self.rgb.set_color(Color::OFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LedSignal, Message};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[test]
    fn test_closer_is_redder() {
        assert_eq!(proximity_color(0.0, 50.0), Color { r: 255, g: 0, b: 0 });
        assert_eq!(proximity_color(50.0, 50.0), Color::WHITE);
        assert_eq!(proximity_color(500.0, 50.0), Color::WHITE);

        let near = proximity_color(10.0, 50.0);
        let far = proximity_color(40.0, 50.0);
        assert!(near.g < far.g);
    }

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<Color>>>);

    impl RgbOutput for Recording {
        fn set_color(&mut self, color: Color) -> ServiceResult<()> {
            self.0.lock().unwrap().push(color);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_then_back_to_white_and_off_on_cleanup() {
        let rgb = Recording::default();
        let mut led = LedIndicator::new(Box::new(rgb.clone()));
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        let mut ctx = ServiceContext::new(ServiceId::LED, in_rx, out_tx);

        let signal = Message::new(
            ServiceId::ULTRASONIC,
            Payload::Led(LedSignal {
                distance: 0.0,
                threshold: 50.0,
                duration: 0.5,
            }),
        )
        .unwrap();
        in_tx.send(signal).await.unwrap();

        led.setup().await.unwrap();
        led.step(&mut ctx).await.unwrap();
        led.cleanup().await.unwrap();

        assert_eq!(
            *rgb.0.lock().unwrap(),
            vec![Color::WHITE, Color { r: 255, g: 0, b: 0 }, Color::WHITE, Color::OFF]
        );
    }
}
