//! A service's view of its channels and tuning

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::bus::recv_timeout;
use crate::domain::{Message, ServiceId, TuningConfig};
use crate::error::{ServiceError, ServiceResult};

/// Channels and tuning snapshot handed to [`Service::step`](super::Service::step)
///
/// The service reads commands from `incoming` and writes events to
/// `outgoing`; its router sits on the other end of `outgoing`. Tuning is
/// read-only here, the router holds the only writer.
pub struct ServiceContext {
    id: ServiceId,
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Message>,
    tuning: Option<watch::Receiver<TuningConfig>>,
}

impl ServiceContext {
    pub fn new(id: ServiceId, incoming: mpsc::Receiver<Message>, outgoing: mpsc::Sender<Message>) -> Self {
        debug!(%id, "ServiceContext::new: called");
        Self {
            id,
            incoming,
            outgoing,
            tuning: None,
        }
    }

    /// Attach the read side of the router-owned tuning
    pub fn with_tuning(mut self, tuning: watch::Receiver<TuningConfig>) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Latest tuning published by the router, if this service adapts
    pub fn tuning(&self) -> Option<TuningConfig> {
        self.tuning.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Queue an event for the router, waiting for space
    pub async fn emit(&self, message: Message) -> ServiceResult<()> {
        debug!(service = %self.id, kind = message.payload().kind(), "ServiceContext::emit: called");
        self.outgoing.send(message).await.map_err(|_| ServiceError::ChannelClosed {
            target: format!("{} router", self.id),
        })
    }

    /// Queue an event for the router without waiting
    pub fn try_emit(&self, message: Message) -> ServiceResult<()> {
        debug!(service = %self.id, kind = message.payload().kind(), "ServiceContext::try_emit: called");
        self.outgoing.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServiceError::ChannelFull {
                target: format!("{} router", self.id),
            },
            mpsc::error::TrySendError::Closed(_) => ServiceError::ChannelClosed {
                target: format!("{} router", self.id),
            },
        })
    }

    /// Take one pending command, if any
    pub fn try_recv(&mut self) -> Option<Message> {
        self.incoming.try_recv().ok()
    }

    /// Wait for the next command; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    /// Wait up to `timeout` for the next command
    pub async fn recv_timeout(&mut self, timeout: Duration) -> ServiceResult<Option<Message>> {
        recv_timeout(&mut self.incoming, timeout).await
    }
}
