//! Typed events exchanged between chain workers, and the plumbing to deliver them.

mod chain;
pub use chain::ChainEvent;

mod emitter;
pub use emitter::EventEmitter;

mod handler;
pub use handler::ChainEventHandler;

mod broadcast;
pub use broadcast::{ChainEventNotification, EventForwarder};
