//! Display service: ticks the state machine and publishes its output

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::filters::{ImageFilters, test_pattern};
use super::render::Frame;
use super::state::{DEFAULT_REINFORCEMENT_DIVISOR, DisplayState, RestoreRequest, StagePulse};
use crate::clock::{Clock, SystemClock};
use crate::domain::{Message, Payload, Pulse, ServiceId};
use crate::error::{ServiceError, ServiceResult};
use crate::service::{Service, ServiceContext};

/// Where the original image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    File(PathBuf),
    TestPattern { width: u32, height: u32 },
}

/// Display timing and tuning
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub source: ImageSource,
    pub tick_interval: Duration,
    pub level_step: f64,
    pub reinforcement_divisor: f64,
    pub pulse_duration: Duration,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            source: ImageSource::TestPattern {
                width: 320,
                height: 240,
            },
            tick_interval: Duration::from_millis(50),
            level_step: 10.0,
            reinforcement_divisor: DEFAULT_REINFORCEMENT_DIVISOR,
            pulse_duration: Duration::from_secs(2),
        }
    }
}

/// The image display actuator
pub struct DisplayService {
    id: ServiceId,
    settings: DisplaySettings,
    frames: mpsc::Sender<Frame>,
    clock: Arc<dyn Clock>,
    state: Option<DisplayState>,
    sequence: u64,
    dropped_frames: u64,
}

impl DisplayService {
    pub fn new(settings: DisplaySettings, frames: mpsc::Sender<Frame>) -> Self {
        Self::with_clock(settings, frames, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: DisplaySettings, frames: mpsc::Sender<Frame>, clock: Arc<dyn Clock>) -> Self {
        debug!(?settings, "DisplayService::new: called");
        Self {
            id: ServiceId::DISPLAY,
            settings,
            frames,
            clock,
            state: None,
            sequence: 0,
            dropped_frames: 0,
        }
    }

    fn take_request(&self, ctx: &mut ServiceContext) -> Option<RestoreRequest> {
        let message = ctx.try_recv()?;
        let request = RestoreRequest::from_message(&message);
        if request.is_none() {
            warn!(
                origin = %message.origin(),
                kind = message.payload().kind(),
                "Display ignoring message that is not a restoration request"
            );
        }
        request
    }

    fn emit_pulse(&self, ctx: &ServiceContext, pulse: StagePulse) -> ServiceResult<()> {
        info!(from = %pulse.from, to = %pulse.to, intensity = pulse.intensity, "Stage restored, pulsing motor");
        let message = Message::new(
            self.id.clone(),
            Payload::Pulse(Pulse {
                duration: self.settings.pulse_duration.as_secs_f64(),
                intensity: pulse.intensity,
            }),
        )?
        .with_target(ServiceId::VIBRATION_MOTOR);

        match ctx.try_emit(message) {
            Ok(()) => Ok(()),
            Err(ServiceError::ChannelFull { target }) => {
                warn!(%target, "Pulse dropped, channel full");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn publish(&mut self, frame: Frame) {
        match self.frames.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped_frames += 1;
                warn!(
                    sequence = frame.sequence,
                    dropped = self.dropped_frames,
                    "Frame channel full, dropping frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("DisplayService::publish: render loop gone");
            }
        }
    }
}

#[async_trait]
impl Service for DisplayService {
    fn id(&self) -> &ServiceId {
        &self.id
    }

    async fn setup(&mut self) -> ServiceResult<()> {
        let original = match &self.settings.source {
            ImageSource::File(path) => {
                info!(path = %path.display(), "Loading display image");
                image::open(path)?.to_rgb8()
            }
            ImageSource::TestPattern { width, height } => {
                info!(width, height, "No image configured, using test pattern");
                test_pattern(*width, *height)
            }
        };

        let state = DisplayState::new(
            original,
            self.settings.level_step,
            Box::new(ImageFilters),
            self.clock.clone(),
        )
        .with_reinforcement_divisor(self.settings.reinforcement_divisor);
        self.state = Some(state);
        Ok(())
    }

    async fn step(&mut self, ctx: &mut ServiceContext) -> ServiceResult<()> {
        let request = self.take_request(ctx);
        let Some(state) = self.state.as_mut() else {
            return Err(ServiceError::Device("display stepped before setup".to_string()));
        };
        let output = state.tick(request);

        if let Some(pulse) = output.pulse {
            self.emit_pulse(ctx, pulse)?;
        }

        let frame = Frame {
            image: output.image,
            stage: output.stage,
            level: output.level,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.publish(frame);

        tokio::time::sleep(self.settings.tick_interval).await;
        Ok(())
    }

    async fn cleanup(&mut self) -> ServiceResult<()> {
        info!(
            frames = self.sequence,
            dropped = self.dropped_frames,
            "Display shut down"
        );
        self.state = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DisplayStage, StrengthSignal};

    fn settings() -> DisplaySettings {
        DisplaySettings {
            source: ImageSource::TestPattern { width: 8, height: 8 },
            tick_interval: Duration::from_millis(10),
            level_step: 100.0,
            ..Default::default()
        }
    }

    fn context() -> (ServiceContext, mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        (ServiceContext::new(ServiceId::DISPLAY, in_rx, out_tx), in_tx, out_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_frames_and_drops_when_full() {
        let (frames_tx, mut frames_rx) = mpsc::channel(2);
        let mut display = DisplayService::new(settings(), frames_tx);
        let (mut ctx, _in_tx, _out_rx) = context();

        display.setup().await.unwrap();
        for _ in 0..4 {
            display.step(&mut ctx).await.unwrap();
        }

        assert_eq!(display.dropped_frames, 2);
        let first = frames_rx.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.stage, DisplayStage::BlackWhite);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restoration_emits_motor_pulses() {
        let (frames_tx, _frames_rx) = mpsc::channel(64);
        let mut display = DisplayService::new(settings(), frames_tx);
        let (mut ctx, in_tx, mut out_rx) = context();
        display.setup().await.unwrap();

        // level step 100: two ticks per filter stage
        for _ in 0..7 {
            display.step(&mut ctx).await.unwrap();
        }
        assert_eq!(display.state.as_ref().unwrap().stage(), DisplayStage::End);

        let touch = Message::new(
            ServiceId::TOUCH,
            Payload::Strength(StrengthSignal {
                duration: 24.0,
                strength: 100.0,
            }),
        )
        .unwrap();
        in_tx.send(touch).await.unwrap();
        for _ in 0..7 {
            display.step(&mut ctx).await.unwrap();
        }
        assert_eq!(display.state.as_ref().unwrap().stage(), DisplayStage::Start);

        let mut intensities = Vec::new();
        while let Ok(message) = out_rx.try_recv() {
            assert_eq!(message.target(), Some(&ServiceId::VIBRATION_MOTOR));
            if let Payload::Pulse(pulse) = message.payload() {
                intensities.push(pulse.intensity);
            }
        }
        assert_eq!(intensities, vec![0.33, 0.66, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_request_per_tick_then_reinforcement() {
        let (frames_tx, _frames_rx) = mpsc::channel(8);
        let clock = Arc::new(crate::clock::ManualClock::new());
        let mut display = DisplayService::with_clock(settings(), frames_tx, clock);
        let (mut ctx, in_tx, _out_rx) = context();
        display.setup().await.unwrap();

        let request = || {
            Message::new(
                ServiceId::FACE_RECOGNITION,
                Payload::Strength(StrengthSignal {
                    duration: 4.0,
                    strength: 2.0,
                }),
            )
            .unwrap()
        };
        in_tx.send(request()).await.unwrap();
        in_tx.send(request()).await.unwrap();

        display.step(&mut ctx).await.unwrap();
        let state = display.state.as_ref().unwrap();
        assert_eq!(state.duration(), 4.0);
        assert_eq!(state.level_step(), 2.0);
        assert!(state.is_reversing());

        display.step(&mut ctx).await.unwrap();
        let state = display.state.as_ref().unwrap();
        assert_eq!(state.duration(), 6.0);
        assert_eq!(state.level_step(), 3.0);
        assert!(ctx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_missing_image_fails_setup() {
        let (frames_tx, _frames_rx) = mpsc::channel(1);
        let mut display = DisplayService::new(
            DisplaySettings {
                source: ImageSource::File(PathBuf::from("/nonexistent/afterimage.png")),
                ..settings()
            },
            frames_tx,
        );
        assert!(matches!(display.setup().await, Err(ServiceError::Image(_))));
    }
}
