//! Device abstractions used by sensors and actuators
//!
//! Physical drivers live outside this crate. Services only see these traits;
//! [`simulated`] provides seeded stand-ins so the whole installation can run
//! on a desk.

pub mod simulated;

use async_trait::async_trait;

use crate::error::ServiceResult;

pub use simulated::{SimulatedDistance, SimulatedFaces, SimulatedPwm, SimulatedRgb, SimulatedTouch};

/// Distance sensor, e.g. an ultrasonic ranger
#[async_trait]
pub trait DistanceProbe: Send {
    /// Check the device is reachable
    async fn connect(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    /// One reading in centimetres
    async fn measure(&mut self) -> ServiceResult<f64>;
}

/// Event from a touch surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
}

/// Touch surface
#[async_trait]
pub trait TouchInput: Send {
    async fn connect(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    /// Wait for the next event; must be cancel-safe
    async fn next_event(&mut self) -> ServiceResult<TouchEvent>;
}

/// Camera plus face detector
#[async_trait]
pub trait FaceDetector: Send {
    async fn connect(&mut self) -> ServiceResult<()> {
        Ok(())
    }

    /// Grab a frame and return how many faces are in it
    async fn detect(&mut self) -> ServiceResult<usize>;
}

/// Single PWM channel, duty cycle in [0, 1]
pub trait PwmOutput: Send {
    fn set_duty(&mut self, duty: f64) -> ServiceResult<()>;
}

/// RGB colour, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
    pub const OFF: Color = Color { r: 0, g: 0, b: 0 };
}

/// Three-channel LED
pub trait RgbOutput: Send {
    fn set_color(&mut self, color: Color) -> ServiceResult<()>;
}

/// Every device the installation needs
pub struct HardwareSet {
    pub distance: Box<dyn DistanceProbe>,
    pub touch: Box<dyn TouchInput>,
    pub faces: Box<dyn FaceDetector>,
    pub motor: Box<dyn PwmOutput>,
    pub led: Box<dyn RgbOutput>,
}

impl HardwareSet {
    /// Simulated devices driven by one seed
    pub fn simulated(seed: u64) -> Self {
        tracing::debug!(seed, "HardwareSet::simulated: called");
        Self {
            distance: Box::new(SimulatedDistance::new(seed)),
            touch: Box::new(SimulatedTouch::new(seed.wrapping_add(1))),
            faces: Box::new(SimulatedFaces::new(seed.wrapping_add(2))),
            motor: Box::new(SimulatedPwm::new("vibration-motor")),
            led: Box::new(SimulatedRgb::new()),
        }
    }
}
