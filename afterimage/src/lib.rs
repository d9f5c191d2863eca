//! Afterimage - sensor-driven degrading image installation
//!
//! An image on display slowly falls apart: first its colour goes, then its
//! focus, then its light. Visitors hold it together. Distance, touch and face
//! sensors push restoration signals that make the display walk back toward the
//! original, while a vibration motor and an LED give physical feedback.
//!
//! # Core Concepts
//!
//! - **One task per service**: sensors and actuators each run a setup/step/cleanup loop
//! - **One router per service**: forwards output to the target's input and adapts tuning
//! - **Single writer**: a router is the only writer of its service's tuning
//! - **Drop, don't block**: the display never waits on the renderer
//!
//! # Modules
//!
//! - [`domain`] - Messages, service ids, stages, tuning
//! - [`bus`] - Channel pairs and the service registry
//! - [`service`] - Service trait and the shared task loop
//! - [`router`] - Forwarding with adaptive tuning
//! - [`display`] - Degrade/restore state machine and rendering
//! - [`orchestrator`] - Wiring, start-up and shutdown
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod actuators;
pub mod bus;
pub mod cli;
pub mod clock;
pub mod config;
pub mod display;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod orchestrator;
pub mod router;
pub mod sensors;
pub mod service;

// Re-export commonly used types
pub use bus::{ChannelPair, ServiceRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Profile};
pub use display::{DisplayState, Frame, HeadlessSurface, SnapshotSurface, Surface};
pub use domain::{DisplayStage, Message, Payload, ServiceId, TuningConfig, TuningEvent};
pub use error::{ServiceError, ServiceResult};
pub use hardware::HardwareSet;
pub use orchestrator::{Orchestrator, OrchestratorSettings, ServiceSet, ShutdownReport};
pub use router::{Router, RouterStats};
pub use service::{Service, ServiceContext, ServiceHandle, spawn_service};
