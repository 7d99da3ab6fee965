use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Compact index of a chain within a dependency set.
///
/// Executing messages refer to the chain of their initiating message by index. The
/// [`DependencySet`](crate::DependencySet) maps indices to chain ids and back.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChainIndex(pub u32);
