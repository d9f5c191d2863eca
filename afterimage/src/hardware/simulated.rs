//! Simulated devices
//!
//! All randomness comes from a seeded `StdRng`, so a given seed always plays
//! back the same visitors. Waiting uses `tokio::time::sleep`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::{Color, DistanceProbe, FaceDetector, PwmOutput, RgbOutput, TouchEvent, TouchInput};
use crate::error::ServiceResult;

/// Ranger that sees a visitor now and then
pub struct SimulatedDistance {
    rng: StdRng,
    visit_chance: f64,
}

impl SimulatedDistance {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            visit_chance: 0.05,
        }
    }

    pub fn with_visit_chance(mut self, chance: f64) -> Self {
        self.visit_chance = chance.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl DistanceProbe for SimulatedDistance {
    async fn measure(&mut self) -> ServiceResult<f64> {
        let distance = if self.rng.random_bool(self.visit_chance) {
            self.rng.random_range(5.0..60.0)
        } else {
            self.rng.random_range(150.0..400.0)
        };
        trace!(distance, "SimulatedDistance::measure");
        Ok(distance)
    }
}

/// Touch surface producing short down/move/up gestures at random intervals
pub struct SimulatedTouch {
    rng: StdRng,
    pending: VecDeque<TouchEvent>,
    min_gap: Duration,
    max_gap: Duration,
}

impl SimulatedTouch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pending: VecDeque::new(),
            min_gap: Duration::from_secs(20),
            max_gap: Duration::from_secs(90),
        }
    }

    /// Bounds of the pause between gestures
    pub fn with_gap(mut self, min: Duration, max: Duration) -> Self {
        self.min_gap = min.min(max);
        self.max_gap = max.max(min);
        self
    }

    fn gesture(&mut self) {
        let x = self.rng.random_range(0.0..1.0);
        let y = self.rng.random_range(0.0..1.0);
        self.pending.push_back(TouchEvent::Down { x, y });
        for _ in 0..self.rng.random_range(0..4) {
            let dx: f64 = self.rng.random_range(-0.05..0.05);
            let dy: f64 = self.rng.random_range(-0.05..0.05);
            self.pending.push_back(TouchEvent::Move {
                x: (x + dx).clamp(0.0, 1.0),
                y: (y + dy).clamp(0.0, 1.0),
            });
        }
        self.pending.push_back(TouchEvent::Up);
    }
}

#[async_trait]
impl TouchInput for SimulatedTouch {
    async fn next_event(&mut self) -> ServiceResult<TouchEvent> {
        if self.pending.is_empty() {
            let gap = if self.max_gap > self.min_gap {
                self.rng.random_range(self.min_gap..self.max_gap)
            } else {
                self.min_gap
            };
            debug!(?gap, "SimulatedTouch::next_event: waiting for next gesture");
            tokio::time::sleep(gap).await;
            self.gesture();
        } else {
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        // gesture() always queues at least Down and Up
        Ok(self.pending.pop_front().unwrap_or(TouchEvent::Up))
    }
}

/// Camera that occasionally sees a face
pub struct SimulatedFaces {
    rng: StdRng,
    frame_time: Duration,
    presence_chance: f64,
}

impl SimulatedFaces {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            frame_time: Duration::from_millis(100),
            presence_chance: 0.02,
        }
    }
}

#[async_trait]
impl FaceDetector for SimulatedFaces {
    async fn detect(&mut self) -> ServiceResult<usize> {
        tokio::time::sleep(self.frame_time).await;
        let faces = if self.rng.random_bool(self.presence_chance) {
            self.rng.random_range(1..=3)
        } else {
            0
        };
        trace!(faces, "SimulatedFaces::detect");
        Ok(faces)
    }
}

/// PWM channel that only logs
#[derive(Debug)]
pub struct SimulatedPwm {
    name: &'static str,
    duty: f64,
}

impl SimulatedPwm {
    pub fn new(name: &'static str) -> Self {
        Self { name, duty: 0.0 }
    }

    pub fn duty(&self) -> f64 {
        self.duty
    }
}

impl PwmOutput for SimulatedPwm {
    fn set_duty(&mut self, duty: f64) -> ServiceResult<()> {
        debug!(channel = self.name, duty, "SimulatedPwm::set_duty");
        self.duty = duty.clamp(0.0, 1.0);
        Ok(())
    }
}

/// RGB LED that only logs
#[derive(Debug)]
pub struct SimulatedRgb {
    color: Color,
}

impl SimulatedRgb {
    pub fn new() -> Self {
        Self { color: Color::OFF }
    }

    pub fn color(&self) -> Color {
        self.color
    }
}

impl Default for SimulatedRgb {
    fn default() -> Self {
        Self::new()
    }
}

impl RgbOutput for SimulatedRgb {
    fn set_color(&mut self, color: Color) -> ServiceResult<()> {
        debug!(?color, "SimulatedRgb::set_color");
        self.color = color;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_distance_is_reproducible_per_seed() {
        let mut a = SimulatedDistance::new(7).with_visit_chance(0.5);
        let mut b = SimulatedDistance::new(7).with_visit_chance(0.5);
        for _ in 0..20 {
            let (da, db) = (a.measure().await.unwrap(), b.measure().await.unwrap());
            assert_eq!(da, db);
            assert!((5.0..400.0).contains(&da));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_gesture_shape() {
        let mut touch = SimulatedTouch::new(3).with_gap(Duration::from_secs(1), Duration::from_secs(2));

        assert!(matches!(touch.next_event().await.unwrap(), TouchEvent::Down { .. }));
        loop {
            match touch.next_event().await.unwrap() {
                TouchEvent::Move { x, y } => assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)),
                TouchEvent::Up => break,
                TouchEvent::Down { .. } => panic!("gesture started before the previous one ended"),
            }
        }
        assert!(matches!(touch.next_event().await.unwrap(), TouchEvent::Down { .. }));
    }

    #[test]
    fn test_pwm_clamps_duty() {
        let mut pwm = SimulatedPwm::new("test");
        pwm.set_duty(1.7).unwrap();
        assert_eq!(pwm.duty(), 1.0);
    }
}
