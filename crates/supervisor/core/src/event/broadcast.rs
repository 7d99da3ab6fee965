use crate::event::{ChainEvent, ChainEventHandler};
use alloy_primitives::ChainId;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

/// A [`ChainEvent`] tagged with the chain it was dispatched on.
pub type ChainEventNotification = (ChainId, ChainEvent);

/// Republishes every event dispatched on a chain to outside subscribers.
///
/// Forwarding never counts as acting on an event.
#[derive(Debug)]
pub struct EventForwarder {
    chain_id: ChainId,
    sender: broadcast::Sender<ChainEventNotification>,
}

impl EventForwarder {
    /// Creates a forwarder publishing the events of `chain_id` on `sender`.
    pub const fn new(chain_id: ChainId, sender: broadcast::Sender<ChainEventNotification>) -> Self {
        Self { chain_id, sender }
    }
}

#[async_trait]
impl ChainEventHandler for EventForwarder {
    async fn on_event(&self, event: &ChainEvent) -> bool {
        if self.sender.send((self.chain_id, *event)).is_err() {
            trace!(target: "supervisor::worker", chain_id = self.chain_id, ?event, "No subscribers for chain event");
        }
        false
    }
}
