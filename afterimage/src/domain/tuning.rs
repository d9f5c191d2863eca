//! Adaptive tuning parameters
//!
//! Each adaptive sensor owns one `TuningConfig`. Its router is the only writer:
//! a delivered signal escalates strength and duration by one step, an idle
//! receive window relaxes them by one step. Both are clamped to their bounds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::stage::DisplayStage;

/// What the router observed during one receive window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningEvent {
    /// A strength signal was forwarded
    Delivered,
    /// The receive timed out
    Idle,
}

/// Escalation and de-escalation bounds for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TuningConfig {
    pub strength: f64,
    pub strength_max: f64,
    pub strength_min: f64,
    pub strength_step: f64,

    /// Restoration duration in seconds
    pub duration: f64,
    pub duration_max: f64,
    pub duration_min: f64,
    pub duration_step: f64,

    /// Stage the display should jump to on this sensor's signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<DisplayStage>,

    /// Pause the router for a cooldown after each forwarded signal
    #[serde(default)]
    pub should_sleep_after_send: bool,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            strength: 0.5,
            strength_max: 2.0,
            strength_min: 0.1,
            strength_step: 0.1,
            duration: 2.0,
            duration_max: 5.0,
            duration_min: 0.1,
            duration_step: 0.1,
            stage: None,
            should_sleep_after_send: false,
        }
    }
}

impl TuningConfig {
    /// Check that bounds are ordered, steps non-negative and current values in range
    pub fn validate(&self) -> Result<(), String> {
        let axes = [
            (
                "strength",
                self.strength,
                self.strength_min,
                self.strength_max,
                self.strength_step,
            ),
            (
                "duration",
                self.duration,
                self.duration_min,
                self.duration_max,
                self.duration_step,
            ),
        ];
        for (name, value, min, max, step) in axes {
            if [value, min, max, step].iter().any(|v| !v.is_finite()) {
                return Err(format!("{} values must be finite", name));
            }
            if min > max {
                return Err(format!("{}-min ({}) exceeds {}-max ({})", name, min, name, max));
            }
            if step < 0.0 {
                return Err(format!("{}-step must not be negative", name));
            }
            if value < min || value > max {
                return Err(format!("{} ({}) is outside [{}, {}]", name, value, min, max));
            }
        }
        if self.duration_min < 0.0 {
            return Err("duration-min must not be negative".to_string());
        }
        Ok(())
    }

    /// Apply one transition of the escalate/relax table
    pub fn apply(&mut self, event: TuningEvent) {
        match event {
            TuningEvent::Delivered => self.escalate(),
            TuningEvent::Idle => self.relax(),
        }
    }

    /// Raise strength and duration by one step, capped at their maxima
    pub fn escalate(&mut self) {
        self.strength = (self.strength + self.strength_step).min(self.strength_max);
        self.duration = (self.duration + self.duration_step).min(self.duration_max);
    }

    /// Lower strength and duration by one step, floored at their minima
    pub fn relax(&mut self) {
        self.strength = (self.strength - self.strength_step).max(self.strength_min);
        self.duration = (self.duration - self.duration_step).max(self.duration_min);
    }

    /// Cooldown the router observes after forwarding, if enabled
    pub fn cooldown(&self, factor: f64) -> Option<Duration> {
        if !self.should_sleep_after_send {
            return None;
        }
        Duration::try_from_secs_f64(self.duration * factor).ok()
    }
}
