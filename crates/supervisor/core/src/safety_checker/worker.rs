use crate::{
    event::{ChainEvent, ChainEventHandler, EventEmitter},
    safety_checker::{CrossSafeOutcome, CrossSafePromoter, CrossSafetyError, metrics::Metrics},
};
use alloy_primitives::ChainId;
use async_trait::async_trait;
use interop_supervisor_metrics::observe_metrics_for_result;
use interop_supervisor_storage::CrossChainSafetyProvider;
use interop_supervisor_types::DependencySet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Promotes the cross-safe head of one chain on every [`ChainEvent::UpdateCrossSafeRequest`].
///
/// Successful promotions and invalidations are broadcast through the [`EventEmitter`]:
/// [`ChainEvent::CrossSafeUpdate`] to this chain, [`ChainEvent::LocalSafeInvalidated`] to the
/// chain of every invalidated block.
#[derive(Debug)]
pub struct CrossSafeWorker<P, D> {
    chain_id: ChainId,
    promoter: Arc<CrossSafePromoter<P, D>>,
    emitter: Arc<EventEmitter>,
    metrics_enabled: bool,
}

impl<P, D> CrossSafeWorker<P, D>
where
    P: CrossChainSafetyProvider + Send + Sync + 'static,
    D: DependencySet + Send + Sync + 'static,
{
    /// Creates a worker for `chain_id`.
    pub const fn new(
        chain_id: ChainId,
        promoter: Arc<CrossSafePromoter<P, D>>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        Self { chain_id, promoter, emitter, metrics_enabled: false }
    }

    /// Enables metrics for this worker.
    pub fn with_metrics(mut self) -> Self {
        self.metrics_enabled = true;
        Metrics::init(self.chain_id);
        self
    }

    /// Runs one promotion attempt and broadcasts its outcome.
    pub fn update(&self) -> Result<CrossSafeOutcome, CrossSafetyError> {
        let outcome = if self.metrics_enabled {
            observe_metrics_for_result!(
                Metrics::CROSS_SAFE_UPDATE_SUCCESS_TOTAL,
                Metrics::CROSS_SAFE_UPDATE_ERROR_TOTAL,
                Metrics::CROSS_SAFE_UPDATE_DURATION_SECONDS,
                Metrics::CROSS_SAFE_METHOD_UPDATE,
                self.promoter.update(self.chain_id),
                "chain_id" => self.chain_id.to_string()
            )
        } else {
            self.promoter.update(self.chain_id)
        }?;

        match &outcome {
            CrossSafeOutcome::Promoted(pair) | CrossSafeOutcome::ScopeExpanded(pair) => {
                self.emitter.emit(
                    self.chain_id,
                    ChainEvent::CrossSafeUpdate { derived_ref_pair: *pair },
                );
            }
            CrossSafeOutcome::Invalidated(blocks) => {
                for block in blocks {
                    info!(
                        target: "supervisor::safety_checker",
                        chain_id = block.chain_id,
                        invalidated = %block.block,
                        "Broadcasting local-safe invalidation"
                    );
                    self.emitter.emit(
                        block.chain_id,
                        ChainEvent::LocalSafeInvalidated { invalidated: block.block },
                    );
                }
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl<P, D> ChainEventHandler for CrossSafeWorker<P, D>
where
    P: CrossChainSafetyProvider + std::fmt::Debug + Send + Sync + 'static,
    D: DependencySet + std::fmt::Debug + Send + Sync + 'static,
{
    async fn on_event(&self, event: &ChainEvent) -> bool {
        if !matches!(event, ChainEvent::UpdateCrossSafeRequest) {
            return false;
        }

        if let Err(err) = self.update() {
            if err.is_future() {
                debug!(
                    target: "supervisor::safety_checker",
                    chain_id = self.chain_id,
                    %err,
                    "No cross-safe candidate ready"
                );
            } else {
                warn!(
                    target: "supervisor::safety_checker",
                    chain_id = self.chain_id,
                    %err,
                    "Failed to update cross-safe head"
                );
            }
        }
        true
    }
}
