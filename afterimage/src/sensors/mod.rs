//! Sensors that push restoration signals
//!
//! Every sensor composes its strength signal from the latest tuning snapshot
//! its router published, so escalation shows up in the very next message.

mod face;
mod touch;
mod ultrasonic;

pub use face::FaceSensor;
pub use touch::TouchSensor;
pub use ultrasonic::UltrasonicSensor;

use crate::domain::{Message, Payload, ServiceId, StrengthSignal, TuningConfig};
use crate::error::ServiceResult;
use crate::service::ServiceContext;

/// Build a strength signal from the context's tuning, falling back to `fallback`
pub(crate) fn strength_message(id: &ServiceId, ctx: &ServiceContext, fallback: &TuningConfig) -> ServiceResult<Message> {
    let tuning = ctx.tuning().unwrap_or_else(|| fallback.clone());
    let message = Message::new(
        id.clone(),
        Payload::Strength(StrengthSignal {
            duration: tuning.duration,
            strength: tuning.strength,
        }),
    )?;
    Ok(match tuning.stage {
        Some(stage) => message.with_stage(stage),
        None => message,
    })
}
