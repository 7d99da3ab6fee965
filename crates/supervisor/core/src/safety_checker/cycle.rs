use crate::safety_checker::{CrossSafetyError, HazardSet, ValidationError};
use interop_supervisor_storage::CrossChainSafetyProvider;
use interop_supervisor_types::{BlockSeal, ChainIndex, DependencySet, OpenedBlock};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

/// Opened hazard block with the offset of its first log in the dense node numbering.
#[derive(Debug)]
struct HazardBlock {
    opened: OpenedBlock,
    offset: usize,
}

/// Dependency graph over the logs of all hazard blocks.
///
/// Nodes are `(chain, log index)` pairs numbered densely per chain. Edges point from a log to
/// the logs that must come after it.
#[derive(Debug, Default)]
struct LogGraph {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl LogGraph {
    fn with_nodes(count: usize) -> Self {
        Self { successors: vec![Vec::new(); count], in_degree: vec![0; count] }
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.successors[from].push(to);
        self.in_degree[to] += 1;
    }

    /// Returns `true` if every node could be ordered, using Kahn's algorithm.
    fn is_acyclic(mut self) -> bool {
        let mut ready: VecDeque<usize> = self
            .in_degree
            .iter()
            .enumerate()
            .filter_map(|(node, degree)| (*degree == 0).then_some(node))
            .collect();

        let mut ordered = 0;
        while let Some(node) = ready.pop_front() {
            ordered += 1;
            for next in std::mem::take(&mut self.successors[node]) {
                self.in_degree[next] -= 1;
                if self.in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        ordered == self.in_degree.len()
    }
}

/// Checks that the logs of the hazard blocks at `timestamp` can be ordered.
///
/// Logs within a block are ordered by index, and every executing message with the same
/// timestamp orders the initiating log before itself. A cycle in that graph means no valid
/// ordering exists and the candidate has to be invalidated.
pub fn check_hazard_cycles<P, D>(
    provider: &P,
    dependency_set: &D,
    timestamp: u64,
    hazards: &HazardSet,
) -> Result<(), CrossSafetyError>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    if hazards.is_empty() {
        return Ok(());
    }

    let blocks = open_hazard_blocks(provider, dependency_set, hazards)?;
    let node_count = blocks.values().map(|b| b.opened.log_count as usize).sum();
    let mut graph = LogGraph::with_nodes(node_count);

    for (chain, block) in &blocks {
        for log_index in 1..block.opened.log_count as usize {
            graph.add_edge(block.offset + log_index - 1, block.offset + log_index);
        }

        for (log_index, message) in &block.opened.executing_messages {
            if message.timestamp != timestamp {
                continue;
            }
            let Some(init) = blocks.get(&message.chain) else {
                return Err(ValidationError::UnknownChain(message.chain).into());
            };
            if message.chain == *chain && message.log_index == *log_index {
                return Err(ValidationError::SelfReferencing {
                    chain: *chain,
                    log_index: *log_index,
                }
                .into());
            }
            if message.block_number != init.opened.block.number {
                continue;
            }
            if message.log_index >= init.opened.log_count {
                return Err(ValidationError::InvalidLogIndex {
                    chain: message.chain,
                    log_index: message.log_index,
                    log_count: init.opened.log_count,
                }
                .into());
            }
            graph.add_edge(
                init.offset + message.log_index as usize,
                block.offset + *log_index as usize,
            );
        }
    }

    if !graph.is_acyclic() {
        warn!(
            target: "supervisor::safety_checker",
            timestamp,
            hazards = hazards.len(),
            "Cycle detected among hazard blocks"
        );
        return Err(ValidationError::Cycle { timestamp }.into());
    }

    debug!(target: "supervisor::safety_checker", timestamp, nodes = node_count, "Hazard logs are acyclic");
    Ok(())
}

fn open_hazard_blocks<P, D>(
    provider: &P,
    dependency_set: &D,
    hazards: &HazardSet,
) -> Result<BTreeMap<ChainIndex, HazardBlock>, CrossSafetyError>
where
    P: CrossChainSafetyProvider,
    D: DependencySet,
{
    let mut blocks = BTreeMap::new();
    let mut offset = 0;

    for (chain, seal) in hazards.entries() {
        let chain_id = dependency_set
            .chain_id_from_index(*chain)
            .map_err(CrossSafetyError::from_index_lookup)?;
        let opened = provider.open_block(chain_id, seal.number)?;
        if opened.block.id() != seal.id() {
            return Err(ValidationError::BlockMismatch {
                expected: *seal,
                found: BlockSeal::from(opened.block),
            }
            .into());
        }
        if let Some(log_index) =
            opened.executing_messages.keys().find(|index| **index >= opened.log_count)
        {
            return Err(ValidationError::InvalidLogIndex {
                chain: *chain,
                log_index: *log_index,
                log_count: opened.log_count,
            }
            .into());
        }

        let log_count = opened.log_count as usize;
        blocks.insert(*chain, HazardBlock { opened, offset });
        offset += log_count;
    }
    Ok(blocks)
}
