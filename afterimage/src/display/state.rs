//! Degrade/restore state machine
//!
//! Pure state: no channels, no sleeping. The display service feeds it at most
//! one restoration request per tick and publishes what it returns.
//!
//! Degrading walks START → BLACK_WHITE → BLURRY → LIGHTNESS → END, raising
//! `level` by `level_step` inside each filter stage and filtering the current
//! image. Restoring walks back, lowering `level` and always recomposing from
//! the original image so filter error never compounds on the way back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info};

use super::filters::StageFilter;
use crate::clock::Clock;
use crate::domain::{DisplayStage, Message, Payload};

/// Upper bound of `level`
pub const MAX_LEVEL: f64 = 100.0;

/// Default divisor applied to reinforcing requests
pub const DEFAULT_REINFORCEMENT_DIVISOR: f64 = 2.0;

/// Restoration request decoded from an incoming strength signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoreRequest {
    /// Seconds of restoration
    pub duration: f64,
    /// Level change per tick while restoring
    pub level_step: f64,
    /// Optional stage to jump to
    pub stage: Option<DisplayStage>,
}

impl RestoreRequest {
    /// Decode a strength signal; other payloads are not restoration requests
    pub fn from_message(message: &Message) -> Option<Self> {
        match message.payload() {
            Payload::Strength(signal) => Some(Self {
                duration: signal.duration,
                level_step: signal.strength,
                stage: message.stage(),
            }),
            _ => None,
        }
    }
}

/// Motor pulse owed for crossing a stage boundary while restoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePulse {
    pub from: DisplayStage,
    pub to: DisplayStage,
    pub intensity: f64,
}

impl StagePulse {
    fn crossing(from: DisplayStage) -> Option<Self> {
        let intensity = match from {
            DisplayStage::Lightness => 0.33,
            DisplayStage::Blurry => 0.66,
            DisplayStage::BlackWhite => 1.0,
            DisplayStage::Start | DisplayStage::End => return None,
        };
        Some(Self {
            from,
            to: from.previous(),
            intensity,
        })
    }
}

/// Result of one tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub image: Arc<RgbImage>,
    pub stage: DisplayStage,
    pub level: f64,
    pub reversing: bool,
    pub pulse: Option<StagePulse>,
}

/// State of the staged image pipeline
pub struct DisplayState {
    stage: DisplayStage,
    level: f64,
    level_step: f64,
    level_step_initial: f64,
    duration: f64,
    reinforcement_divisor: f64,
    reversing: bool,
    restoration_active: bool,
    restoration_deadline: Option<Instant>,
    original: Arc<RgbImage>,
    current: Arc<RgbImage>,
    filter: Box<dyn StageFilter>,
    clock: Arc<dyn Clock>,
}

impl DisplayState {
    pub fn new(original: RgbImage, level_step: f64, filter: Box<dyn StageFilter>, clock: Arc<dyn Clock>) -> Self {
        debug!(
            width = original.width(),
            height = original.height(),
            level_step,
            "DisplayState::new: called"
        );
        let original = Arc::new(original);
        Self {
            stage: DisplayStage::Start,
            level: 0.0,
            level_step,
            level_step_initial: level_step,
            duration: 0.0,
            reinforcement_divisor: DEFAULT_REINFORCEMENT_DIVISOR,
            reversing: false,
            restoration_active: false,
            restoration_deadline: None,
            current: original.clone(),
            original,
            filter,
            clock,
        }
    }

    /// Divisor applied to requests that arrive while already restoring
    pub fn with_reinforcement_divisor(mut self, divisor: f64) -> Self {
        if divisor > 0.0 && divisor.is_finite() {
            self.reinforcement_divisor = divisor;
        }
        self
    }

    pub fn stage(&self) -> DisplayStage {
        self.stage
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn level_step(&self) -> f64 {
        self.level_step
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_reversing(&self) -> bool {
        self.reversing
    }

    pub fn is_restoration_active(&self) -> bool {
        self.restoration_active
    }

    pub fn current_image(&self) -> &Arc<RgbImage> {
        &self.current
    }

    pub fn original_image(&self) -> &Arc<RgbImage> {
        &self.original
    }

    /// Merge a restoration request into the state
    ///
    /// The first request after a reset replaces duration and level step. One
    /// that arrives while restoring adds its values divided by the
    /// reinforcement divisor.
    pub fn process_request(&mut self, request: RestoreRequest) {
        debug!(?request, reversing = self.reversing, "DisplayState::process_request: called");

        if let Some(stage) = request.stage
            && stage != self.stage
        {
            info!(from = %self.stage, to = %stage, level = self.level, "Display jumping to requested stage");
            self.stage = stage;
            self.level = self.level.clamp(0.0, MAX_LEVEL);
            self.current = Arc::new(self.filter.compose(&self.original, self.stage, self.level));
        }

        if self.reversing {
            self.duration += request.duration / self.reinforcement_divisor;
            self.level_step += request.level_step / self.reinforcement_divisor;
            debug!(
                duration = self.duration,
                level_step = self.level_step,
                "DisplayState::process_request: reinforced"
            );
        } else {
            self.duration = request.duration;
            self.level_step = request.level_step;
        }

        self.restoration_active = true;
        let span = Duration::try_from_secs_f64(self.duration).unwrap_or_default();
        self.restoration_deadline = Some(self.clock.now() + span);
    }

    /// Recompute `reversing` from the restoration deadline
    pub fn update_reversing(&mut self) {
        let now = self.clock.now();
        let within_deadline = self.restoration_deadline.is_some_and(|deadline| now < deadline);
        let reversing = self.restoration_active && within_deadline;

        if self.restoration_active && !reversing {
            info!(stage = %self.stage, level = self.level, "Restoration finished, resuming degradation");
            self.restoration_active = false;
            self.restoration_deadline = None;
            self.level_step = self.level_step_initial;
        }
        self.reversing = reversing;
    }

    /// Advance the distortion by one step
    pub fn degrade(&mut self) -> Arc<RgbImage> {
        match self.stage {
            DisplayStage::Start => {
                self.stage = DisplayStage::BlackWhite;
                self.level = 0.0;
                debug!("DisplayState::degrade: START -> BLACK_WHITE");
            }
            DisplayStage::End => {}
            stage => {
                if self.level < MAX_LEVEL {
                    self.level = (self.level + self.level_step).clamp(0.0, MAX_LEVEL);
                    self.current = Arc::new(self.filter.apply(stage, &self.current, self.level));
                } else {
                    self.level = 0.0;
                    self.stage = stage.next();
                    debug!(from = %stage, to = %self.stage, "DisplayState::degrade: stage advanced");
                }
            }
        }
        self.current.clone()
    }

    /// Undo the distortion by one step, returning a pulse on stage boundaries
    pub fn restore(&mut self) -> Option<StagePulse> {
        match self.stage {
            DisplayStage::Start => None,
            DisplayStage::End => {
                self.stage = DisplayStage::Lightness;
                self.level = MAX_LEVEL;
                self.current = Arc::new(self.filter.compose(&self.original, self.stage, self.level));
                debug!("DisplayState::restore: END -> LIGHTNESS");
                None
            }
            stage => {
                if self.level > 0.0 {
                    self.level = (self.level - self.level_step).clamp(0.0, MAX_LEVEL);
                    self.current = Arc::new(self.filter.compose(&self.original, stage, self.level));
                    return None;
                }

                let pulse = StagePulse::crossing(stage);
                self.stage = stage.previous();
                if self.stage == DisplayStage::Start {
                    self.level = 0.0;
                    self.current = self.original.clone();
                } else {
                    self.level = MAX_LEVEL;
                    self.current = Arc::new(self.filter.compose(&self.original, self.stage, self.level));
                }
                debug!(from = %stage, to = %self.stage, "DisplayState::restore: stage receded");
                pulse
            }
        }
    }

    /// One full tick: take the request, refresh `reversing`, then move one step
    pub fn tick(&mut self, request: Option<RestoreRequest>) -> TickOutput {
        if let Some(request) = request {
            self.process_request(request);
        }
        self.update_reversing();

        let pulse = if self.reversing {
            self.restore()
        } else {
            self.degrade();
            None
        };

        TickOutput {
            image: self.current.clone(),
            stage: self.stage,
            level: self.level,
            reversing: self.reversing,
            pulse,
        }
    }
}
