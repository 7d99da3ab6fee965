use crate::safety_checker::{CrossSafetyError, HazardSet, ValidationError};
use alloy_eips::BlockNumHash;
use alloy_primitives::ChainId;
use interop_supervisor_storage::{CrossChainSafetyProvider, EntryNotFoundError, StorageError};
use interop_supervisor_types::{BlockSeal, ChainIndex, DependencySet, ExecutingMessage};
use std::collections::BTreeSet;
use tracing::debug;

/// Checks every executing message of the candidate and of its hazard blocks.
///
/// A message either references a hazard block, in which case both sides are promoted
/// together, or a block that is already cross-safe within `scope`. Messages with the
/// candidate's timestamp must reference a hazard block.
///
/// Returns the number of jointly promoted dependencies.
pub fn validate_cross_safe_dependencies<P, D>(
    provider: &P,
    dependency_set: &D,
    scope: BlockNumHash,
    chain_id: ChainId,
    candidate: BlockSeal,
    hazards: &HazardSet,
) -> Result<usize, CrossSafetyError>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    let own_index = dependency_set.chain_index_from_id(chain_id)?;
    let mut blocks = vec![(chain_id, candidate)];
    for (chain, block) in hazards.entries() {
        if *chain == own_index && block.id() == candidate.id() {
            continue;
        }
        let hazard_chain_id = dependency_set
            .chain_id_from_index(*chain)
            .map_err(|_| ValidationError::UnknownChain(*chain))?;
        blocks.push((hazard_chain_id, *block));
    }

    let mut deferred = BTreeSet::new();
    for (block_chain_id, block) in blocks {
        let opened = provider.open_block(block_chain_id, block.number)?;
        for message in opened.messages() {
            if let Some(dependency) = joint_dependency(hazards, message, candidate.timestamp)? {
                deferred.insert(dependency);
                continue;
            }
            check_cross_safe_dependency(provider, dependency_set, scope, message)?;
        }
    }

    for (chain, block_number) in &deferred {
        if !hazards.get(*chain).is_some_and(|hazard| hazard.number == *block_number) {
            return Err(ValidationError::MissingDependency {
                chain: *chain,
                block_number: *block_number,
            }
            .into());
        }
    }

    debug!(
        target: "supervisor::safety_checker",
        chain_id,
        %candidate,
        joint = deferred.len(),
        "Validated cross-safe dependencies"
    );
    Ok(deferred.len())
}

/// Returns the hazard the message depends on, if it is promoted jointly with the candidate.
fn joint_dependency(
    hazards: &HazardSet,
    message: &ExecutingMessage,
    timestamp: u64,
) -> Result<Option<(ChainIndex, u64)>, CrossSafetyError> {
    let in_hazards =
        hazards.get(message.chain).is_some_and(|hazard| hazard.number == message.block_number);
    if in_hazards {
        return Ok(Some((message.chain, message.block_number)));
    }
    if message.timestamp == timestamp {
        return Err(ValidationError::MissingDependency {
            chain: message.chain,
            block_number: message.block_number,
        }
        .into());
    }
    Ok(None)
}

fn check_cross_safe_dependency<P, D>(
    provider: &P,
    dependency_set: &D,
    scope: BlockNumHash,
    message: &ExecutingMessage,
) -> Result<(), CrossSafetyError>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    let init_chain_id = dependency_set
        .chain_id_from_index(message.chain)
        .map_err(|_| ValidationError::UnknownChain(message.chain))?;
    let init_block = provider.contains(init_chain_id, &message.contains_query())?;

    let source = match provider.cross_derived_to_source(init_chain_id, init_block.id()) {
        Ok(source) => source,
        Err(StorageError::FutureData) |
        Err(StorageError::EntryNotFound(EntryNotFoundError::DerivedBlockNotFound(_))) => {
            return Err(CrossSafetyError::Future {
                chain_id: init_chain_id,
                block_number: init_block.number,
            });
        }
        Err(err) => return Err(err.into()),
    };

    if source.number > scope.number {
        return Err(CrossSafetyError::OutOfScope {
            chain_id: init_chain_id,
            block_number: init_block.number,
            source_number: source.number,
            scope_number: scope.number,
        });
    }
    Ok(())
}
