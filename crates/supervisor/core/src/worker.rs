use crate::event::{ChainEvent, ChainEventHandler};
use alloy_primitives::ChainId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Serially dispatches the events of one chain to its handlers.
///
/// Every `interval` the worker also injects a [`ChainEvent::UpdateCrossSafeRequest`], so a
/// chain keeps retrying promotion while its candidate is not decidable yet.
#[derive(Debug)]
pub struct ChainWorker {
    chain_id: ChainId,
    events: mpsc::Receiver<ChainEvent>,
    handlers: Vec<Arc<dyn ChainEventHandler>>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl ChainWorker {
    /// Creates a worker without handlers.
    pub const fn new(
        chain_id: ChainId,
        events: mpsc::Receiver<ChainEvent>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self { chain_id, events, handlers: Vec::new(), interval, cancel_token }
    }

    /// Appends a handler. Handlers see every event in registration order.
    pub fn with_handler(mut self, handler: Arc<dyn ChainEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Runs until cancelled or until every sender of the event channel is dropped.
    pub async fn run(mut self) {
        let chain_id = self.chain_id;
        info!(target: "supervisor::worker", chain_id, handlers = self.handlers.len(), "Started chain worker");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(target: "supervisor::worker", chain_id, "Canceled chain worker");
                    break;
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!(target: "supervisor::worker", chain_id, "Event channel closed");
                        break;
                    };
                    self.dispatch(event).await;
                }
                _ = ticker.tick() => {
                    self.dispatch(ChainEvent::UpdateCrossSafeRequest).await;
                }
            }
        }

        info!(target: "supervisor::worker", chain_id, "Stopped chain worker");
    }

    async fn dispatch(&self, event: ChainEvent) {
        let mut handled = false;
        for handler in &self.handlers {
            handled |= handler.on_event(&event).await;
        }
        if !handled {
            trace!(target: "supervisor::worker", chain_id = self.chain_id, ?event, "No handler for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interop_supervisor_types::BlockSeal;

    #[derive(Debug)]
    struct Recorder {
        seen: mpsc::UnboundedSender<ChainEvent>,
        handles_reorg: bool,
    }

    #[async_trait]
    impl ChainEventHandler for Recorder {
        async fn on_event(&self, event: &ChainEvent) -> bool {
            let _ = self.seen.send(*event);
            self.handles_reorg && matches!(event, ChainEvent::ChainReorg { .. })
        }
    }

    fn recorder(handles_reorg: bool) -> (Arc<Recorder>, mpsc::UnboundedReceiver<ChainEvent>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { seen, handles_reorg }), rx)
    }

    #[tokio::test]
    async fn test_dispatches_ticks_and_events_to_all_handlers() {
        let (first, mut first_seen) = recorder(true);
        let (second, mut second_seen) = recorder(false);
        let (tx, rx) = mpsc::channel(4);
        let cancel_token = CancellationToken::new();

        let worker = ChainWorker::new(1, rx, Duration::from_secs(3600), cancel_token.clone())
            .with_handler(first)
            .with_handler(second);
        let handle = tokio::spawn(worker.run());

        // the first tick completes immediately
        assert_eq!(first_seen.recv().await, Some(ChainEvent::UpdateCrossSafeRequest));
        assert_eq!(second_seen.recv().await, Some(ChainEvent::UpdateCrossSafeRequest));

        let reorg = ChainEvent::ChainReorg { bad_block: BlockSeal::default() };
        tx.send(reorg).await.unwrap();
        assert_eq!(first_seen.recv().await, Some(reorg));
        assert_eq!(second_seen.recv().await, Some(reorg));

        cancel_token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_channel_closes() {
        let (handler, _seen) = recorder(false);
        let (tx, rx) = mpsc::channel(1);
        let worker = ChainWorker::new(1, rx, Duration::from_secs(3600), CancellationToken::new())
            .with_handler(handler);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), worker.run()).await.unwrap();
    }
}
