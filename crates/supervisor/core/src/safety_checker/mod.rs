//! # Cross-Chain Block Safety Checker
//!
//! Decides whether the next local-safe block of a chain may become cross-safe.
//!
//! A candidate is checked in four steps before it is promoted: its same-timestamp dependencies
//! are collected into a [`HazardSet`], every hazard must be within the candidate's source scope,
//! the logs of the hazards must be free of cyclic message ordering, and every other executing
//! message must resolve to a block that is already cross-safe within the scope.
mod error;
pub use error::{CrossSafetyError, ValidationError};

mod hazard;
pub use hazard::{CrossValidity, HazardSet, HazardSetBuilder, MAX_HAZARD_BLOCK_CHECKS};

mod cycle;
pub use cycle::check_hazard_cycles;

mod frontier;
pub use frontier::{CrossSafeScope, check_safe_frontier};

mod dependencies;
pub use dependencies::validate_cross_safe_dependencies;

mod metrics;

mod promoter;
pub use promoter::{CrossSafeOutcome, CrossSafePromoter};

mod worker;
pub use worker::CrossSafeWorker;

#[cfg(test)]
pub(crate) mod test_utils;
