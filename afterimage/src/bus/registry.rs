//! Immutable routing table from service identifier to incoming channel

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{Message, ServiceId};
use crate::error::ServiceError;

/// Lookup table routers use to reach a target's incoming channel
///
/// Built once by [`RegistryBuilder`] and shared behind an `Arc`; there is no
/// way to add or remove entries afterwards.
#[derive(Debug)]
pub struct ServiceRegistry {
    incoming: HashMap<ServiceId, mpsc::Sender<Message>>,
}

impl ServiceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.incoming.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    /// Registered services in a stable order
    pub fn services(&self) -> Vec<&ServiceId> {
        let mut ids: Vec<_> = self.incoming.keys().collect();
        ids.sort();
        ids
    }

    /// Hand a message to `target` without waiting
    pub fn deliver(&self, target: &ServiceId, message: Message) -> Result<(), ServiceError> {
        debug!(%target, origin = %message.origin(), "ServiceRegistry::deliver: called");
        let tx = self
            .incoming
            .get(target)
            .ok_or_else(|| ServiceError::UnknownService(target.clone()))?;

        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServiceError::ChannelFull {
                target: target.to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => ServiceError::ChannelClosed {
                target: target.to_string(),
            },
        })
    }
}

/// Collects incoming senders before the registry is frozen
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    incoming: HashMap<ServiceId, mpsc::Sender<Message>>,
}

impl RegistryBuilder {
    /// Register a service's incoming sender; a repeated id replaces the earlier entry
    pub fn register(mut self, id: ServiceId, incoming: mpsc::Sender<Message>) -> Self {
        debug!(%id, "RegistryBuilder::register: called");
        if self.incoming.insert(id.clone(), incoming).is_some() {
            warn!(%id, "Service registered twice, keeping the latest channel");
        }
        self
    }

    pub fn build(self) -> ServiceRegistry {
        debug!(count = self.incoming.len(), "RegistryBuilder::build: called");
        ServiceRegistry {
            incoming: self.incoming,
        }
    }
}
