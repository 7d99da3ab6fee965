use crate::safety_checker::{CrossSafetyError, ValidationError};
use alloy_primitives::ChainId;
use derive_more::Constructor;
use interop_supervisor_storage::CrossChainSafetyProvider;
use interop_supervisor_types::{BlockSeal, ChainIndex, DependencySet};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, btree_map::Entry},
};
use tracing::debug;

/// Maximum number of blocks opened while building one [`HazardSet`].
pub const MAX_HAZARD_BLOCK_CHECKS: usize = 10_000;

/// Decides whether a block with an older timestamp than the candidate may be depended on.
pub trait CrossValidity {
    /// Returns `Ok(())` if `block` of `chain_id` is valid at the required safety level.
    fn is_cross_valid_block(&self, chain_id: ChainId, block: BlockSeal)
    -> Result<(), CrossSafetyError>;
}

/// The blocks, at most one per chain, that must be promoted together with a candidate.
///
/// A hazard is a block with the same timestamp as the block depending on it: timestamps alone
/// do not order the messages between them, so the hazards are promoted jointly after the
/// cycle check proved their logs acyclic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HazardSet {
    entries: BTreeMap<ChainIndex, BlockSeal>,
}

impl HazardSet {
    /// Creates a hazard set from known entries.
    pub const fn from_entries(entries: BTreeMap<ChainIndex, BlockSeal>) -> Self {
        Self { entries }
    }

    /// The hazard blocks by chain.
    pub const fn entries(&self) -> &BTreeMap<ChainIndex, BlockSeal> {
        &self.entries
    }

    /// Returns the hazard block of `chain`, if any.
    pub fn get(&self, chain: ChainIndex) -> Option<&BlockSeal> {
        self.entries.get(&chain)
    }

    /// Returns the number of hazard blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the candidate has no same-timestamp dependencies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct PotentialHazard {
    chain_id: ChainId,
    block: BlockSeal,
}

/// Builds the [`HazardSet`] of a candidate block.
///
/// Traverses the executing messages of the candidate and, transitively, of every hazard found,
/// with an explicit stack bounded by `max_checks`.
#[derive(Debug, Constructor)]
pub struct HazardSetBuilder<'a, P, D, V> {
    provider: &'a P,
    dependency_set: &'a D,
    validity: &'a V,
    max_checks: usize,
}

impl<P, D, V> HazardSetBuilder<'_, P, D, V>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
    V: CrossValidity,
{
    /// Builds the hazard set of `block` on `chain_id`.
    pub fn build(&self, chain_id: ChainId, block: BlockSeal) -> Result<HazardSet, CrossSafetyError> {
        debug!(target: "supervisor::safety_checker", chain_id, %block, "Building hazard set");

        let mut entries = BTreeMap::new();
        let mut stack = vec![PotentialHazard { chain_id, block }];
        let mut processed = 0;

        while let Some(next) = stack.pop() {
            if processed >= self.max_checks {
                return Err(CrossSafetyError::HazardLimitExceeded(self.max_checks));
            }
            processed += 1;

            for hazard in self.check_block(next, &mut entries)? {
                stack.push(hazard);
            }
        }

        debug!(
            target: "supervisor::safety_checker",
            chain_id,
            %block,
            hazards = entries.len(),
            processed,
            "Built hazard set"
        );
        Ok(HazardSet { entries })
    }

    /// Checks the executing messages of one block, returning the newly found hazards.
    fn check_block(
        &self,
        next: PotentialHazard,
        entries: &mut BTreeMap<ChainIndex, BlockSeal>,
    ) -> Result<Vec<PotentialHazard>, CrossSafetyError> {
        let PotentialHazard { chain_id, block: candidate } = next;

        let opened = self.provider.open_block(chain_id, candidate.number)?;
        if opened.block.id() != candidate.id() {
            return Err(ValidationError::BlockMismatch {
                expected: candidate,
                found: opened.block.seal(),
            }
            .into());
        }
        if opened.executing_messages.is_empty() {
            return Ok(Vec::new());
        }

        if !self.dependency_set.can_execute_at(chain_id, candidate.timestamp)? {
            return Err(ValidationError::ExecutionNotPermitted {
                chain_id,
                timestamp: candidate.timestamp,
            }
            .into());
        }
        let own_index = self.dependency_set.chain_index_from_id(chain_id)?;

        let mut found = Vec::new();
        for (log_index, message) in &opened.executing_messages {
            if message.chain == own_index &&
                message.block_number == candidate.number &&
                message.log_index == *log_index
            {
                return Err(ValidationError::SelfReferencing {
                    chain: own_index,
                    log_index: *log_index,
                }
                .into());
            }

            let init_chain_id = self
                .dependency_set
                .chain_id_from_index(message.chain)
                .map_err(CrossSafetyError::from_index_lookup)?;

            if !self.dependency_set.can_initiate_at(init_chain_id, message.timestamp)? {
                return Err(ValidationError::InitiationNotPermitted {
                    chain_id: init_chain_id,
                    timestamp: message.timestamp,
                }
                .into());
            }

            if message.timestamp > candidate.timestamp {
                return Err(ValidationError::TimestampInvariant {
                    block: candidate,
                    message_timestamp: message.timestamp,
                }
                .into());
            }

            let included_in = self.provider.contains(init_chain_id, &message.contains_query())?;

            match message.timestamp.cmp(&candidate.timestamp) {
                Ordering::Less => {
                    self.validity.is_cross_valid_block(init_chain_id, included_in)?;
                }
                _ => match entries.entry(message.chain) {
                    Entry::Occupied(existing) => {
                        if existing.get().id() != included_in.id() {
                            return Err(ValidationError::HazardConflict {
                                chain: message.chain,
                                existing: *existing.get(),
                                found: included_in,
                            }
                            .into());
                        }
                    }
                    Entry::Vacant(vacant) => {
                        debug!(
                            target: "supervisor::safety_checker",
                            chain_id = init_chain_id,
                            block = %included_in,
                            "Adding hazard block"
                        );
                        vacant.insert(included_in);
                        found.push(PotentialHazard { chain_id: init_chain_id, block: included_in });
                    }
                },
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety_checker::test_utils::{
        MockDepSet, MockProvider, MockValidity, dependency_set, executing, opened, seal,
    };
    use interop_supervisor_storage::StorageError;
    use interop_supervisor_types::{ContainsQuery, DependencySetError};

    const TS: u64 = 100;

    // chain 900 block 10 -> chain 901 block 20 -> chain 902 block 30, all at the same timestamp
    fn linear_provider(back_edge: bool) -> MockProvider {
        let a = seal(900, 10, TS);
        let b = seal(901, 20, TS);
        let c = seal(902, 30, TS);

        let mut provider = MockProvider::new();
        provider.expect_open_block().returning(move |chain_id, number| match (chain_id, number) {
            (900, 10) => Ok(opened(a, 1, &[(0, executing(1, 20, 0, TS))])),
            (901, 20) => Ok(opened(b, 1, &[(0, executing(2, 30, 0, TS))])),
            (902, 30) if back_edge => Ok(opened(c, 1, &[(0, executing(0, 10, 0, TS))])),
            (902, 30) => Ok(opened(c, 1, &[])),
            _ => Err(StorageError::FutureData),
        });
        provider.expect_contains().returning(move |chain_id, query: &ContainsQuery| {
            match (chain_id, query.block_number) {
                (900, 10) => Ok(a),
                (901, 20) => Ok(b),
                (902, 30) => Ok(c),
                _ => Err(StorageError::ConflictError),
            }
        });
        provider
    }

    #[test]
    fn test_transitive_same_timestamp_hazards() {
        let provider = linear_provider(false);
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let hazards = builder.build(900, seal(900, 10, TS)).unwrap();

        assert_eq!(hazards.len(), 2);
        assert_eq!(hazards.get(ChainIndex(1)), Some(&seal(901, 20, TS)));
        assert_eq!(hazards.get(ChainIndex(2)), Some(&seal(902, 30, TS)));
        assert_eq!(hazards.get(ChainIndex(0)), None);
    }

    #[test]
    fn test_back_edge_adds_candidate_chain() {
        let provider = linear_provider(true);
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let hazards = builder.build(900, seal(900, 10, TS)).unwrap();

        assert_eq!(hazards.len(), 3);
        assert_eq!(hazards.get(ChainIndex(0)), Some(&seal(900, 10, TS)));
    }

    #[test]
    fn test_is_deterministic() {
        let provider = linear_provider(true);
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let first = builder.build(900, seal(900, 10, TS));
        let second = builder.build(900, seal(900, 10, TS));
        assert_eq!(first, second);
    }

    #[test]
    fn test_message_from_the_future() {
        let block = seal(900, 10, TS);
        let mut provider = MockProvider::new();
        provider
            .expect_open_block()
            .returning(move |_, _| Ok(opened(block, 1, &[(0, executing(1, 20, 0, 200))])));
        provider.expect_contains().never();
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let err = builder.build(900, block).unwrap_err();

        assert_eq!(
            err,
            CrossSafetyError::Conflict(ValidationError::TimestampInvariant {
                block,
                message_timestamp: 200,
            })
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn test_older_message_requires_cross_valid_block() {
        let block = seal(900, 10, TS);
        let init = seal(901, 7, 90);
        let mut provider = MockProvider::new();
        provider
            .expect_open_block()
            .returning(move |_, _| Ok(opened(block, 1, &[(0, executing(1, 7, 0, 90))])));
        provider.expect_contains().returning(move |_, _| Ok(init));

        let mut validity = MockValidity::new();
        validity
            .expect_is_cross_valid_block()
            .withf(move |chain_id, seal| *chain_id == 901 && *seal == init)
            .times(1)
            .returning(|chain_id, seal| {
                Err(CrossSafetyError::Future { chain_id, block_number: seal.number })
            });
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let err = builder.build(900, block).unwrap_err();
        assert!(err.is_future());
    }

    #[test]
    fn test_conflicting_hazards_on_one_chain() {
        let a = seal(900, 10, TS);
        let b = seal(901, 20, TS);
        let b_other = seal(901, 21, TS);
        let mut provider = MockProvider::new();
        provider.expect_open_block().returning(move |chain_id, number| match (chain_id, number) {
            (900, 10) => Ok(opened(
                a,
                2,
                &[(0, executing(1, 20, 0, TS)), (1, executing(1, 21, 0, TS))],
            )),
            (901, 20) => Ok(opened(b, 1, &[])),
            (901, 21) => Ok(opened(b_other, 1, &[])),
            _ => Err(StorageError::FutureData),
        });
        provider.expect_contains().returning(move |_, query| match query.block_number {
            20 => Ok(b),
            _ => Ok(b_other),
        });
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let err = builder.build(900, a).unwrap_err();

        assert_eq!(
            err,
            CrossSafetyError::Conflict(ValidationError::HazardConflict {
                chain: ChainIndex(1),
                existing: b,
                found: b_other,
            })
        );
    }

    #[test]
    fn test_self_referencing_message() {
        let block = seal(900, 10, TS);
        let mut provider = MockProvider::new();
        provider
            .expect_open_block()
            .returning(move |_, _| Ok(opened(block, 2, &[(1, executing(0, 10, 1, TS))])));
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        assert_eq!(
            builder.build(900, block),
            Err(CrossSafetyError::Conflict(ValidationError::SelfReferencing {
                chain: ChainIndex(0),
                log_index: 1,
            }))
        );
    }

    #[test]
    fn test_unknown_chain() {
        let block = seal(900, 10, TS);
        let mut provider = MockProvider::new();
        provider
            .expect_open_block()
            .returning(move |_, _| Ok(opened(block, 1, &[(0, executing(7, 10, 0, TS))])));
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        assert_eq!(
            builder.build(900, block),
            Err(CrossSafetyError::Conflict(ValidationError::UnknownChain(ChainIndex(7))))
        );
    }

    #[test]
    fn test_failed_chain_lookup_is_not_a_conflict() {
        let block = seal(900, 10, TS);
        let mut provider = MockProvider::new();
        provider
            .expect_open_block()
            .returning(move |_, _| Ok(opened(block, 1, &[(0, executing(1, 10, 0, TS))])));
        let validity = MockValidity::new();
        let mut depset = MockDepSet::new();
        depset.expect_can_execute_at().returning(|_, _| Ok(true));
        depset.expect_chain_index_from_id().returning(|_| Ok(ChainIndex(0)));
        depset
            .expect_chain_id_from_index()
            .returning(|_| Err(DependencySetError::UnknownChain(950)));
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        let err = builder.build(900, block).unwrap_err();
        assert_eq!(err, CrossSafetyError::DependencySet(DependencySetError::UnknownChain(950)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_block_mismatch() {
        let block = seal(900, 10, TS);
        let stored = seal(901, 10, TS);
        let mut provider = MockProvider::new();
        provider.expect_open_block().returning(move |_, _| Ok(opened(stored, 0, &[])));
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, MAX_HAZARD_BLOCK_CHECKS);

        assert_eq!(
            builder.build(900, block),
            Err(CrossSafetyError::Conflict(ValidationError::BlockMismatch {
                expected: block,
                found: stored,
            }))
        );
    }

    #[test]
    fn test_check_limit() {
        let provider = linear_provider(false);
        let validity = MockValidity::new();
        let depset = dependency_set();
        let builder = HazardSetBuilder::new(&provider, &depset, &validity, 2);

        assert_eq!(
            builder.build(900, seal(900, 10, TS)),
            Err(CrossSafetyError::HazardLimitExceeded(2))
        );
    }
}
