use alloy_primitives::ChainId;
use std::fmt::Debug;

/// Container for ChainDb metrics.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const STORAGE_REQUESTS_SUCCESS_TOTAL: &'static str =
        "supervisor_storage_success_total";
    pub(crate) const STORAGE_REQUESTS_ERROR_TOTAL: &'static str = "supervisor_storage_error_total";
    pub(crate) const STORAGE_REQUEST_DURATION_SECONDS: &'static str =
        "supervisor_storage_duration_seconds";

    pub(crate) const LOGDB_ENTRY_COUNT: &'static str = "supervisor_logdb_entries_current";
    pub(crate) const LOGDB_SEARCH_ENTRIES_READ: &'static str =
        "supervisor_logdb_search_entries_read";
    pub(crate) const LOGDB_TRUNCATIONS_TOTAL: &'static str = "supervisor_logdb_truncations_total";

    pub(crate) const STORAGE_METHOD_SEAL_BLOCK: &'static str = "seal_block";
    pub(crate) const STORAGE_METHOD_OPEN_BLOCK: &'static str = "open_block";
    pub(crate) const STORAGE_METHOD_CONTAINS: &'static str = "contains";
    pub(crate) const STORAGE_METHOD_FIND_SEALED_BLOCK: &'static str = "find_sealed_block";
    pub(crate) const STORAGE_METHOD_SAVE_DERIVED_BLOCK: &'static str = "save_derived_block";
    pub(crate) const STORAGE_METHOD_SAVE_SOURCE_BLOCK: &'static str = "save_source_block";
    pub(crate) const STORAGE_METHOD_CANDIDATE_CROSS_SAFE: &'static str = "candidate_cross_safe";
    pub(crate) const STORAGE_METHOD_CROSS_DERIVED_TO_SOURCE: &'static str =
        "cross_derived_to_source";
    pub(crate) const STORAGE_METHOD_UPDATE_CROSS_SAFE: &'static str = "update_cross_safe";
    pub(crate) const STORAGE_METHOD_INVALIDATE_LOCAL_SAFE: &'static str = "invalidate_local_safe";
    pub(crate) const STORAGE_METHOD_FIND_DEPENDENT_BLOCKS: &'static str = "find_dependent_blocks";
    pub(crate) const STORAGE_METHOD_REWIND_LOCAL_UNSAFE: &'static str = "rewind_local_unsafe";
    pub(crate) const STORAGE_METHOD_REWIND_CROSS_UNSAFE: &'static str = "rewind_cross_unsafe";
    pub(crate) const STORAGE_METHOD_REWIND_LOCAL_SAFE: &'static str = "rewind_local_safe";
    pub(crate) const STORAGE_METHOD_REWIND_CROSS_SAFE: &'static str = "rewind_cross_safe";

    pub(crate) const STORAGE_HEAD_BLOCK_NUMBER: &'static str =
        "supervisor_storage_head_block_number";

    const METHODS: [&'static str; 15] = [
        Self::STORAGE_METHOD_SEAL_BLOCK,
        Self::STORAGE_METHOD_OPEN_BLOCK,
        Self::STORAGE_METHOD_CONTAINS,
        Self::STORAGE_METHOD_FIND_SEALED_BLOCK,
        Self::STORAGE_METHOD_SAVE_DERIVED_BLOCK,
        Self::STORAGE_METHOD_SAVE_SOURCE_BLOCK,
        Self::STORAGE_METHOD_CANDIDATE_CROSS_SAFE,
        Self::STORAGE_METHOD_CROSS_DERIVED_TO_SOURCE,
        Self::STORAGE_METHOD_UPDATE_CROSS_SAFE,
        Self::STORAGE_METHOD_INVALIDATE_LOCAL_SAFE,
        Self::STORAGE_METHOD_FIND_DEPENDENT_BLOCKS,
        Self::STORAGE_METHOD_REWIND_LOCAL_UNSAFE,
        Self::STORAGE_METHOD_REWIND_CROSS_UNSAFE,
        Self::STORAGE_METHOD_REWIND_LOCAL_SAFE,
        Self::STORAGE_METHOD_REWIND_CROSS_SAFE,
    ];

    pub(crate) fn init(chain_id: ChainId) {
        Self::describe();
        Self::zero(chain_id);
    }

    fn describe() {
        metrics::describe_counter!(
            Self::STORAGE_REQUESTS_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Total number of successful supervisor storage requests"
        );
        metrics::describe_counter!(
            Self::STORAGE_REQUESTS_ERROR_TOTAL,
            metrics::Unit::Count,
            "Total number of failed supervisor storage requests"
        );
        metrics::describe_histogram!(
            Self::STORAGE_REQUEST_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Duration of supervisor storage requests"
        );
        metrics::describe_gauge!(
            Self::STORAGE_HEAD_BLOCK_NUMBER,
            metrics::Unit::Count,
            "Block number of each safety head"
        );
        metrics::describe_gauge!(
            Self::LOGDB_ENTRY_COUNT,
            metrics::Unit::Count,
            "Number of records in the log database"
        );
        metrics::describe_histogram!(
            Self::LOGDB_SEARCH_ENTRIES_READ,
            metrics::Unit::Count,
            "Records scanned per log database lookup"
        );
        metrics::describe_counter!(
            Self::LOGDB_TRUNCATIONS_TOTAL,
            metrics::Unit::Count,
            "Total number of log database truncations"
        );
    }

    fn zero_storage_methods(chain_id: ChainId, method_name: &'static str) {
        metrics::counter!(
            Self::STORAGE_REQUESTS_SUCCESS_TOTAL,
            "method" => method_name,
            "chain_id" => chain_id.to_string()
        )
        .increment(0);

        metrics::counter!(
            Self::STORAGE_REQUESTS_ERROR_TOTAL,
            "method" => method_name,
            "chain_id" => chain_id.to_string()
        )
        .increment(0);

        metrics::histogram!(
            Self::STORAGE_REQUEST_DURATION_SECONDS,
            "method" => method_name,
            "chain_id" => chain_id.to_string()
        )
        .record(0.0);
    }

    fn zero(chain_id: ChainId) {
        for method in Self::METHODS {
            Self::zero_storage_methods(chain_id, method);
        }
        metrics::counter!(Self::LOGDB_TRUNCATIONS_TOTAL, "chain_id" => chain_id.to_string())
            .increment(0);
    }
}

/// Narrow sink for log database observations. Calls are fire-and-forget.
pub trait LogDbMetrics: Debug + Send + Sync {
    /// Current number of records in the database.
    fn record_entry_count(&self, count: u64);

    /// Number of records scanned by a single lookup.
    fn record_search_entries_read(&self, count: u64);

    /// The database was truncated by a rewind.
    fn record_truncation(&self);
}

/// Discards all observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogDbMetrics;

impl LogDbMetrics for NoopLogDbMetrics {
    fn record_entry_count(&self, _count: u64) {}

    fn record_search_entries_read(&self, _count: u64) {}

    fn record_truncation(&self) {}
}

/// Reports observations through the `metrics` facade, labelled by chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainLogDbMetrics {
    chain_id: ChainId,
}

impl ChainLogDbMetrics {
    /// Creates a sink for `chain_id`.
    pub const fn new(chain_id: ChainId) -> Self {
        Self { chain_id }
    }
}

impl LogDbMetrics for ChainLogDbMetrics {
    fn record_entry_count(&self, count: u64) {
        metrics::gauge!(Metrics::LOGDB_ENTRY_COUNT, "chain_id" => self.chain_id.to_string())
            .set(count as f64);
    }

    fn record_search_entries_read(&self, count: u64) {
        metrics::histogram!(
            Metrics::LOGDB_SEARCH_ENTRIES_READ,
            "chain_id" => self.chain_id.to_string()
        )
        .record(count as f64);
    }

    fn record_truncation(&self) {
        metrics::counter!(Metrics::LOGDB_TRUNCATIONS_TOTAL, "chain_id" => self.chain_id.to_string())
            .increment(1);
    }
}
