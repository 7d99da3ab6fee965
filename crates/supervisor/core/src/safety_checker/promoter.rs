use crate::safety_checker::{
    CrossSafeScope, CrossSafetyError, HazardSetBuilder, MAX_HAZARD_BLOCK_CHECKS, ValidationError,
    check_hazard_cycles, check_safe_frontier, metrics::Metrics, validate_cross_safe_dependencies,
};
use alloy_primitives::ChainId;
use interop_supervisor_storage::CrossChainSafetyProvider;
use interop_supervisor_types::{DependencySet, DependentBlock, DerivedBlockRefPair};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one cross-safe promotion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossSafeOutcome {
    /// The candidate became cross-safe.
    Promoted(DerivedBlockRefPair),
    /// The candidate depends on data beyond its scope. The cross-safe head was re-recorded in
    /// the next source block, which becomes the scope of the next attempt.
    ScopeExpanded(DerivedBlockRefPair),
    /// The candidate was invalid. Holds the candidate followed by every dependent block
    /// invalidated with it, in invalidation order.
    Invalidated(Vec<DependentBlock>),
}

/// Advances the cross-safe head of a chain one candidate at a time.
///
/// The promoter is the only component that turns a [`CrossSafetyError`] into an action:
/// conflicts invalidate the candidate and its dependents, out-of-scope errors widen the source
/// scope, every other error is returned so the caller can retry later.
#[derive(Debug)]
pub struct CrossSafePromoter<P, D> {
    provider: Arc<P>,
    dependency_set: D,
    max_hazard_checks: usize,
    metrics_enabled: bool,
}

impl<P, D> CrossSafePromoter<P, D>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    /// Creates a promoter that reads and writes every chain through `provider`.
    pub const fn new(provider: Arc<P>, dependency_set: D) -> Self {
        Self {
            provider,
            dependency_set,
            max_hazard_checks: MAX_HAZARD_BLOCK_CHECKS,
            metrics_enabled: false,
        }
    }

    /// Overrides the maximum number of blocks opened per hazard set.
    pub fn with_max_hazard_checks(mut self, max_hazard_checks: usize) -> Self {
        self.max_hazard_checks = max_hazard_checks;
        self
    }

    /// Records hazard, cycle and invalidation metrics.
    pub fn with_metrics(mut self) -> Self {
        self.metrics_enabled = true;
        self
    }

    /// Attempts to promote the next cross-safe candidate of `chain_id`.
    pub fn update(&self, chain_id: ChainId) -> Result<CrossSafeOutcome, CrossSafetyError> {
        let candidate = self.provider.candidate_cross_safe(chain_id)?;
        debug!(
            target: "supervisor::safety_checker",
            chain_id,
            %candidate,
            "Checking cross-safe candidate"
        );

        let err = match self.check_and_promote(chain_id, candidate) {
            Ok(()) => {
                info!(target: "supervisor::safety_checker", chain_id, %candidate, "Promoted cross-safe block");
                return Ok(CrossSafeOutcome::Promoted(candidate));
            }
            Err(err) => err,
        };

        if err.is_out_of_scope() {
            debug!(target: "supervisor::safety_checker", chain_id, %candidate, %err, "Expanding source scope");
            return self.expand_scope(chain_id, candidate).map(CrossSafeOutcome::ScopeExpanded);
        }
        if err.is_conflict() {
            warn!(
                target: "supervisor::safety_checker",
                chain_id,
                %candidate,
                %err,
                "Invalid cross-safe candidate, invalidating"
            );
            let is_cycle =
                matches!(err, CrossSafetyError::Conflict(ValidationError::Cycle { .. }));
            if self.metrics_enabled && is_cycle {
                Metrics::record_cycle(chain_id);
            }
            let mut invalidated = Vec::new();
            self.invalidate_with_dependents(chain_id, candidate, &mut invalidated)?;
            if self.metrics_enabled {
                Metrics::record_invalidated(chain_id, invalidated.len());
            }
            return Ok(CrossSafeOutcome::Invalidated(invalidated));
        }
        Err(err)
    }

    /// Runs every check on `candidate` and, if all pass, makes it the cross-safe head.
    pub fn check_and_promote(
        &self,
        chain_id: ChainId,
        candidate: DerivedBlockRefPair,
    ) -> Result<(), CrossSafetyError> {
        let provider = &*self.provider;
        let block = candidate.derived.seal();
        let scope = candidate.source.id();

        let opened = provider.open_block(chain_id, block.number)?;
        if opened.block.id() != block.id() {
            return Err(ValidationError::BlockMismatch {
                expected: block,
                found: opened.block.seal(),
            }
            .into());
        }

        let validity = CrossSafeScope::new(provider, scope);
        let hazards = HazardSetBuilder::new(
            provider,
            &self.dependency_set,
            &validity,
            self.max_hazard_checks,
        )
        .build(chain_id, block)?;
        if self.metrics_enabled {
            Metrics::record_hazards(chain_id, hazards.len());
        }

        check_safe_frontier(provider, &self.dependency_set, scope, &hazards)?;
        check_hazard_cycles(provider, &self.dependency_set, block.timestamp, &hazards)?;
        validate_cross_safe_dependencies(
            provider,
            &self.dependency_set,
            scope,
            chain_id,
            block,
            &hazards,
        )?;

        provider.update_cross_safe(chain_id, candidate.source, candidate.derived)?;
        Ok(())
    }

    /// Re-records the current cross-safe block in the source block after the candidate's scope.
    fn expand_scope(
        &self,
        chain_id: ChainId,
        candidate: DerivedBlockRefPair,
    ) -> Result<DerivedBlockRefPair, CrossSafetyError> {
        let new_scope = self.provider.next_source(chain_id, candidate.source.id())?;
        let cross_safe = self.provider.cross_safe(chain_id)?;
        self.provider.update_cross_safe(chain_id, new_scope, cross_safe.derived)?;

        let expanded = DerivedBlockRefPair::new(new_scope, cross_safe.derived);
        info!(target: "supervisor::safety_checker", chain_id, %expanded, "Expanded cross-safe scope");
        Ok(expanded)
    }

    /// Invalidates `block` and, depth-first, every block on other chains that executes one of
    /// its messages.
    fn invalidate_with_dependents(
        &self,
        chain_id: ChainId,
        block: DerivedBlockRefPair,
        invalidated: &mut Vec<DependentBlock>,
    ) -> Result<(), CrossSafetyError> {
        let dependents = self.provider.find_dependent_blocks(chain_id, block.derived.id())?;
        self.provider.invalidate_local_safe(chain_id, block)?;
        invalidated.push(DependentBlock::new(chain_id, block));

        for dependent in dependents {
            // invalidating a block drops every later block of its chain
            let dropped = invalidated.iter().any(|done| {
                done.chain_id == dependent.chain_id &&
                    done.block.derived.number <= dependent.block.derived.number
            });
            if dropped {
                continue;
            }
            info!(
                target: "supervisor::safety_checker",
                chain_id = dependent.chain_id,
                block = %dependent.block.derived,
                initiating_chain = chain_id,
                initiating_block = %block.derived,
                "Invalidating dependent block"
            );
            self.invalidate_with_dependents(dependent.chain_id, dependent.block, invalidated)?;
        }
        Ok(())
    }
}
