//! In-process channels between the write path and the indexers.
//!
//! [`ChangeFeed`] carries [`EntityWrittenEvent`]s from the write path to the
//! indexers; [`IndexerEvents`] carries [`EntityIndexedEvent`]s from one
//! indexer to whoever chains work after it. Both are broadcast channels, so
//! publishing never blocks and never depends on a subscriber being present.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace};

use media_types::{EntityIndexedEvent, EntityWrittenEvent};

/// Buffered events per channel before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast of entity change notifications.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<EntityWrittenEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: EntityWrittenEvent) -> usize {
        if event.is_empty() {
            return 0;
        }
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Change event dropped, no subscribers");
                0
            }
        }
    }

    /// Receive every change event.
    pub fn subscribe(&self) -> broadcast::Receiver<EntityWrittenEvent> {
        self.sender.subscribe()
    }

    /// Receive only events that carry keys of `entity`.
    pub fn subscribe_entity(&self, entity: impl Into<String>) -> EntitySubscription {
        EntitySubscription {
            entity: entity.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Change events filtered down to one entity type.
pub struct EntitySubscription {
    entity: String,
    receiver: broadcast::Receiver<EntityWrittenEvent>,
}

impl EntitySubscription {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Wait for the next event touching the subscribed entity.
    pub async fn recv(&mut self) -> Result<EntityWrittenEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
            trace!(entity = %self.entity, "Skipping change event for other entities");
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<EntityWrittenEvent, TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &EntityWrittenEvent) -> bool {
        !event.primary_keys(&self.entity).is_empty()
    }
}

/// Broadcast of indexer completion notifications.
#[derive(Clone)]
pub struct IndexerEvents {
    sender: broadcast::Sender<EntityIndexedEvent>,
}

impl Default for IndexerEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl IndexerEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a completion. Returns the number of subscribers reached.
    pub fn publish(&self, event: EntityIndexedEvent) -> usize {
        let indexer = event.indexer.clone();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(indexer = %indexer, "Completion event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityIndexedEvent> {
        self.sender.subscribe()
    }
}
