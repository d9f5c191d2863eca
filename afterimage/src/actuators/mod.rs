//! Motor and LED actuators

mod led;
mod motor;

pub use led::{LedIndicator, proximity_color};
pub use motor::VibrationMotor;

use std::time::Duration;

/// How long an actuator step waits for a command before reporting idle
pub const IDLE_WINDOW: Duration = Duration::from_secs(30);
