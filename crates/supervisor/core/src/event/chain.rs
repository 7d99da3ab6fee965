use interop_supervisor_types::{BlockSeal, DerivedBlockRefPair};

/// Represents chain events that are exchanged between the per-chain workers of the supervisor.
///
/// Each event carries the block it is about, allowing the handlers of a chain to take the
/// appropriate action without querying for it first.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChainEvent {
    /// Requests an attempt to promote the next cross-safe candidate.
    UpdateCrossSafeRequest,

    /// A cross safe update event, indicating that a cross safe block has been promoted, or that
    /// the scope of the current cross safe block was widened.
    CrossSafeUpdate {
        /// The derived block and the source scope it is cross-safe in.
        derived_ref_pair: DerivedBlockRefPair,
    },

    /// A local-safe block was invalidated and awaits a replacement.
    LocalSafeInvalidated {
        /// The invalidated block and the source it was derived from.
        invalidated: DerivedBlockRefPair,
    },

    /// The chain diverged from its block source at `bad_block`.
    ChainReorg {
        /// The first block that differs from the block source.
        bad_block: BlockSeal,
    },

    /// A derived block event, indicating that a new local-safe block has been derived.
    LocalDerived {
        /// The derived block and its source block.
        derived_ref_pair: DerivedBlockRefPair,
    },

    /// The chain's safety heads were rewound.
    ChainRewound {
        /// The new local-unsafe head.
        head: BlockSeal,
    },
}
