use crate::safety_checker::{CrossSafetyError, CrossValidity, HazardSet, ValidationError};
use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use derive_more::Constructor;
use interop_supervisor_storage::{CrossChainSafetyProvider, StorageError};
use interop_supervisor_types::{BlockSeal, DependencySet};
use tracing::debug;

/// Accepts blocks that are cross-safe within a source scope.
#[derive(Debug, Constructor)]
pub struct CrossSafeScope<'a, P> {
    provider: &'a P,
    scope: BlockNumHash,
}

impl<P: CrossChainSafetyProvider> CrossValidity for CrossSafeScope<'_, P> {
    fn is_cross_valid_block(
        &self,
        chain_id: ChainId,
        block: BlockSeal,
    ) -> Result<(), CrossSafetyError> {
        let source = match self.provider.cross_derived_to_source(chain_id, block.id()) {
            Ok(source) => source,
            Err(StorageError::FutureData) => {
                return Err(CrossSafetyError::Future { chain_id, block_number: block.number });
            }
            Err(err) => return Err(err.into()),
        };
        ensure_in_scope(chain_id, block.number, source, self.scope)
    }
}

fn ensure_in_scope(
    chain_id: ChainId,
    block_number: u64,
    source: BlockSeal,
    scope: BlockNumHash,
) -> Result<(), CrossSafetyError> {
    if source.number > scope.number {
        return Err(CrossSafetyError::OutOfScope {
            chain_id,
            block_number,
            source_number: source.number,
            scope_number: scope.number,
        });
    }
    Ok(())
}

/// Checks that every hazard block is derived within `scope`.
///
/// A hazard is either cross-safe already, in which case the source it became cross-safe in
/// must not be beyond the scope, or it is the next cross-safe candidate of its chain, in which
/// case the candidate must be that exact block and derived within the scope.
pub fn check_safe_frontier<P, D>(
    provider: &P,
    dependency_set: &D,
    scope: BlockNumHash,
    hazards: &HazardSet,
) -> Result<(), CrossSafetyError>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    for (chain, block) in hazards.entries() {
        let chain_id = dependency_set
            .chain_id_from_index(*chain)
            .map_err(|_| ValidationError::UnknownChain(*chain))?;

        match provider.cross_derived_to_source(chain_id, block.id()) {
            Ok(source) => ensure_in_scope(chain_id, block.number, source, scope)?,
            Err(StorageError::FutureData) => {
                let candidate = provider.candidate_cross_safe(chain_id)?;
                if candidate.derived.number == block.number && candidate.derived.id() != block.id() {
                    return Err(ValidationError::BlockMismatch {
                        expected: *block,
                        found: candidate.derived.seal(),
                    }
                    .into());
                }
                ensure_in_scope(chain_id, block.number, candidate.source.seal(), scope)?;
                debug!(
                    target: "supervisor::safety_checker",
                    chain_id,
                    %block,
                    "Hazard block is the next cross-safe candidate"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety_checker::test_utils::{MockProvider, block_ref, dependency_set, seal};
    use interop_supervisor_types::{ChainIndex, DerivedBlockRefPair};
    use std::collections::BTreeMap;

    const TS: u64 = 100;

    fn scope(number: u64) -> BlockNumHash {
        BlockNumHash { number, hash: Default::default() }
    }

    fn single_hazard(chain: u32, block: BlockSeal) -> HazardSet {
        HazardSet::from_entries(BTreeMap::from([(ChainIndex(chain), block)]))
    }

    #[test]
    fn test_cross_safe_hazard_within_scope() {
        let mut provider = MockProvider::new();
        provider.expect_cross_derived_to_source().returning(|_, _| Ok(seal(1, 5, 0)));
        provider.expect_candidate_cross_safe().never();

        let hazards = single_hazard(1, seal(901, 20, TS));
        assert_eq!(check_safe_frontier(&provider, &dependency_set(), scope(5), &hazards), Ok(()));
        assert_eq!(
            check_safe_frontier(&provider, &dependency_set(), scope(4), &hazards),
            Err(CrossSafetyError::OutOfScope {
                chain_id: 901,
                block_number: 20,
                source_number: 5,
                scope_number: 4,
            })
        );
    }

    #[test]
    fn test_candidate_hazard() {
        let hazard = seal(901, 20, TS);
        let mut provider = MockProvider::new();
        provider.expect_cross_derived_to_source().returning(|_, _| Err(StorageError::FutureData));
        provider.expect_candidate_cross_safe().returning(|_| {
            Ok(DerivedBlockRefPair::new(block_ref(1, 6, 0), block_ref(901, 20, TS)))
        });

        let hazards = single_hazard(1, hazard);
        assert_eq!(check_safe_frontier(&provider, &dependency_set(), scope(6), &hazards), Ok(()));
        assert!(
            check_safe_frontier(&provider, &dependency_set(), scope(5), &hazards)
                .unwrap_err()
                .is_out_of_scope()
        );
    }

    #[test]
    fn test_candidate_differs_from_hazard() {
        let hazard = seal(901, 20, TS);
        let candidate = block_ref(902, 20, TS);
        let mut provider = MockProvider::new();
        provider.expect_cross_derived_to_source().returning(|_, _| Err(StorageError::FutureData));
        provider
            .expect_candidate_cross_safe()
            .returning(move |_| Ok(DerivedBlockRefPair::new(block_ref(1, 6, 0), candidate)));

        let err = check_safe_frontier(&provider, &dependency_set(), scope(6), &single_hazard(1, hazard))
            .unwrap_err();
        assert_eq!(
            err,
            CrossSafetyError::Conflict(ValidationError::BlockMismatch {
                expected: hazard,
                found: candidate.seal(),
            })
        );
    }

    #[test]
    fn test_storage_errors_propagate() {
        let mut provider = MockProvider::new();
        provider.expect_cross_derived_to_source().returning(|_, _| Err(StorageError::FutureData));
        provider
            .expect_candidate_cross_safe()
            .returning(|_| Err(StorageError::AwaitingReplacement(BlockNumHash::default())));

        let err = check_safe_frontier(
            &provider,
            &dependency_set(),
            scope(6),
            &single_hazard(1, seal(901, 20, TS)),
        )
        .unwrap_err();
        assert!(err.is_awaiting_replacement());
    }

    #[test]
    fn test_scope_validity() {
        let mut provider = MockProvider::new();
        provider.expect_cross_derived_to_source().returning(|_, derived| match derived.number {
            3 => Ok(seal(1, 2, 0)),
            _ => Err(StorageError::FutureData),
        });
        let validity = CrossSafeScope::new(&provider, scope(2));

        assert_eq!(validity.is_cross_valid_block(901, seal(901, 3, 90)), Ok(()));
        assert_eq!(
            validity.is_cross_valid_block(901, seal(901, 4, 90)),
            Err(CrossSafetyError::Future { chain_id: 901, block_number: 4 })
        );
    }
}
