//! This crate contains the cross-chain safety logic of the interop supervisor: cross-safe
//! promotion of candidate blocks, reorg handling and the per-chain event loops driving them.

pub mod config;
pub use config::{Config, ConfigError};

pub mod error;
pub use error::SupervisorError;

pub mod event;
pub use event::{
    ChainEvent, ChainEventHandler, ChainEventNotification, EventEmitter, EventForwarder,
};

pub mod reorg;
pub use reorg::{BlockSourceError, BlockSourceRegistry, L2BlockSource, Rewinder, RewinderError};

pub mod safety_checker;
pub use safety_checker::{CrossSafeOutcome, CrossSafePromoter, CrossSafeWorker, CrossSafetyError};

/// Contains the composition root wiring storage, registries and chain workers.
mod supervisor;
pub use supervisor::SupervisorCore;

mod worker;
pub use worker::ChainWorker;
