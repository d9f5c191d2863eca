//! Image display actuator
//!
//! - [`state`]: the degrade/restore state machine
//! - [`filters`]: per-stage image filters
//! - [`service`]: the service that ticks the state machine
//! - [`render`]: frame channel consumer and surfaces

pub mod filters;
pub mod render;
pub mod service;
pub mod state;

pub use filters::{ImageFilters, StageFilter, test_pattern};
pub use render::{DEFAULT_FRAME_BUFFER, Frame, HeadlessSurface, RenderLoop, RenderStats, SnapshotSurface, Surface};
pub use service::{DisplayService, DisplaySettings, ImageSource};
pub use state::{DisplayState, MAX_LEVEL, RestoreRequest, StagePulse, TickOutput};
