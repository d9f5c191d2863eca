//! Channel plumbing between services and routers

mod channels;
mod registry;

pub use channels::{ChannelPair, DEFAULT_CHANNEL_CAPACITY, recv_timeout};
pub use registry::{RegistryBuilder, ServiceRegistry};
