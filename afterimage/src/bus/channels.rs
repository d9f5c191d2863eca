//! Per-service channel pairs and the timed receive

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::Message;
use crate::error::ServiceError;

/// Default capacity of every incoming and outgoing channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Both ends of a service's incoming and outgoing channels
///
/// The orchestrator splits a pair: the service keeps `incoming_rx` and
/// `outgoing_tx`, the registry keeps `incoming_tx`, the router keeps
/// `outgoing_rx`.
pub struct ChannelPair {
    pub incoming_tx: mpsc::Sender<Message>,
    pub incoming_rx: mpsc::Receiver<Message>,
    pub outgoing_tx: mpsc::Sender<Message>,
    pub outgoing_rx: mpsc::Receiver<Message>,
}

impl ChannelPair {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ChannelPair::new: called");
        let capacity = capacity.max(1);
        let (incoming_tx, incoming_rx) = mpsc::channel(capacity);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(capacity);
        Self {
            incoming_tx,
            incoming_rx,
            outgoing_tx,
            outgoing_rx,
        }
    }
}

impl Default for ChannelPair {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Wait up to `timeout` for the next message
///
/// `Ok(None)` means every sender is gone. Expiry yields
/// [`ServiceError::ReceiveTimeout`], which callers treat as a control signal.
pub async fn recv_timeout<T>(rx: &mut mpsc::Receiver<T>, timeout: Duration) -> Result<Option<T>, ServiceError> {
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(received) => Ok(received),
        Err(_) => Err(ServiceError::ReceiveTimeout(timeout)),
    }
}
