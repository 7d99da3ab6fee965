use crate::event::ChainEvent;
use alloy_primitives::ChainId;
use std::{collections::HashMap, sync::RwLock};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Routes [`ChainEvent`]s to the worker of the chain they concern.
///
/// Chains register their event sender once when they start; handlers of any chain may emit
/// follow-up events concurrently.
#[derive(Debug, Default)]
pub struct EventEmitter {
    senders: RwLock<HashMap<ChainId, mpsc::Sender<ChainEvent>>>,
}

impl EventEmitter {
    /// Creates an emitter without registered chains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the event sender of `chain_id`, replacing any previous one.
    pub fn register(&self, chain_id: ChainId, sender: mpsc::Sender<ChainEvent>) {
        match self.senders.write() {
            Ok(mut senders) => {
                senders.insert(chain_id, sender);
            }
            Err(err) => {
                error!(target: "supervisor::worker", chain_id, %err, "Failed to acquire write lock on event senders");
            }
        }
    }

    /// Delivers `event` to the worker of `chain_id` without waiting for channel capacity.
    ///
    /// Returns `false` if the chain is unknown or the event could not be queued.
    pub fn emit(&self, chain_id: ChainId, event: ChainEvent) -> bool {
        let sender = match self.senders.read() {
            Ok(senders) => senders.get(&chain_id).cloned(),
            Err(err) => {
                error!(target: "supervisor::worker", chain_id, %err, "Failed to acquire read lock on event senders");
                return false;
            }
        };
        let Some(sender) = sender else {
            warn!(target: "supervisor::worker", chain_id, ?event, "No event sender registered for chain");
            return false;
        };

        if let Err(err) = sender.try_send(event) {
            error!(
                target: "supervisor::worker",
                chain_id,
                %err,
                "Failed to broadcast chain event",
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_to_registered_chain() {
        let emitter = EventEmitter::new();
        let (tx, mut rx) = mpsc::channel(1);
        emitter.register(7, tx);

        assert!(emitter.emit(7, ChainEvent::UpdateCrossSafeRequest));
        assert_eq!(rx.recv().await, Some(ChainEvent::UpdateCrossSafeRequest));
    }

    #[test]
    fn test_emit_failures() {
        let emitter = EventEmitter::new();
        assert!(!emitter.emit(7, ChainEvent::UpdateCrossSafeRequest));

        let (tx, _rx) = mpsc::channel(1);
        emitter.register(7, tx);
        assert!(emitter.emit(7, ChainEvent::UpdateCrossSafeRequest));
        // channel is full
        assert!(!emitter.emit(7, ChainEvent::UpdateCrossSafeRequest));
    }
}
