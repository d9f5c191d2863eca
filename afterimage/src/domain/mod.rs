//! Domain types shared by every service
//!
//! - [`ServiceId`]: validated service name
//! - [`DisplayStage`]: filter stages of the display pipeline
//! - [`Message`] / [`Payload`]: envelope exchanged over channels
//! - [`TuningConfig`]: per-sensor adaptive parameters

mod id;
mod message;
mod stage;
mod tuning;

pub use id::ServiceId;
pub use message::{LedSignal, Message, Metadata, Payload, Pulse, STAGE_KEY, StrengthSignal};
pub use stage::DisplayStage;
pub use tuning::{TuningConfig, TuningEvent};
