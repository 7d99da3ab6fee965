//! Rewinds chain heads when a chain reorgs below its recorded heads.
//!
//! The [`Rewinder`] walks back from a reorged block until the local database agrees with the
//! chain's [`L2BlockSource`], then rewinds every head above that block.
mod error;
pub use error::{BlockSourceError, RewinderError};

mod source;
pub use source::{BlockSourceRegistry, L2BlockSource};

mod rewinder;
pub use rewinder::Rewinder;

mod metrics;
