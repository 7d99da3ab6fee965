use crate::event::ChainEvent;
use async_trait::async_trait;
use std::fmt::Debug;

/// Handles the events of one chain.
///
/// Handlers of a chain are driven by its [`ChainWorker`](crate::ChainWorker), one event at a
/// time. Handlers ignore events they are not interested in.
#[async_trait]
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait ChainEventHandler: Debug + Send + Sync {
    /// Handles `event`. Returns `true` if the event was acted upon.
    async fn on_event(&self, event: &ChainEvent) -> bool;
}
