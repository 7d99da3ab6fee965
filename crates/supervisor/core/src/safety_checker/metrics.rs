use alloy_primitives::ChainId;

/// Metrics for cross-safe promotion.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    /// Identifier for promotion attempts that promoted, widened the scope or invalidated.
    /// Labels: `chain_id`, `method`
    pub(crate) const CROSS_SAFE_UPDATE_SUCCESS_TOTAL: &'static str =
        "supervisor_cross_safe_update_success_total";

    /// Identifier for promotion attempts that failed or have to be retried.
    /// Labels: `chain_id`, `method`
    pub(crate) const CROSS_SAFE_UPDATE_ERROR_TOTAL: &'static str =
        "supervisor_cross_safe_update_error_total";

    /// Identifier for promotion attempt latency.
    /// Labels: `chain_id`, `method`
    pub(crate) const CROSS_SAFE_UPDATE_DURATION_SECONDS: &'static str =
        "supervisor_cross_safe_update_duration_seconds";

    pub(crate) const CROSS_SAFE_METHOD_UPDATE: &'static str = "update_cross_safe";

    /// Identifier for the number of hazard blocks per promoted candidate.
    /// Labels: `chain_id`
    pub(crate) const CROSS_SAFE_HAZARD_BLOCKS: &'static str = "supervisor_cross_safe_hazard_blocks";

    /// Identifier for candidates rejected because of a message cycle.
    /// Labels: `chain_id`
    pub(crate) const CROSS_SAFE_CYCLES_TOTAL: &'static str = "supervisor_cross_safe_cycles_total";

    /// Identifier for invalidated local-safe blocks, dependents included.
    /// Labels: `chain_id`
    pub(crate) const CROSS_SAFE_INVALIDATED_TOTAL: &'static str =
        "supervisor_cross_safe_invalidated_total";

    pub(crate) fn init(chain_id: ChainId) {
        Self::describe();
        Self::zero(chain_id);
    }

    fn describe() {
        metrics::describe_counter!(
            Self::CROSS_SAFE_UPDATE_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Total number of completed cross-safe promotion attempts",
        );
        metrics::describe_counter!(
            Self::CROSS_SAFE_UPDATE_ERROR_TOTAL,
            metrics::Unit::Count,
            "Total number of cross-safe promotion attempts that returned an error",
        );
        metrics::describe_histogram!(
            Self::CROSS_SAFE_UPDATE_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Latency of cross-safe promotion attempts",
        );
        metrics::describe_histogram!(
            Self::CROSS_SAFE_HAZARD_BLOCKS,
            metrics::Unit::Count,
            "Number of same-timestamp dependencies of promoted blocks",
        );
        metrics::describe_counter!(
            Self::CROSS_SAFE_CYCLES_TOTAL,
            metrics::Unit::Count,
            "Total number of candidates rejected for cyclic message dependencies",
        );
        metrics::describe_counter!(
            Self::CROSS_SAFE_INVALIDATED_TOTAL,
            metrics::Unit::Count,
            "Total number of invalidated local-safe blocks",
        );
    }

    fn zero(chain_id: ChainId) {
        metrics::counter!(
            Self::CROSS_SAFE_UPDATE_SUCCESS_TOTAL,
            "chain_id" => chain_id.to_string(),
            "method" => Self::CROSS_SAFE_METHOD_UPDATE,
        )
        .increment(0);

        metrics::counter!(
            Self::CROSS_SAFE_UPDATE_ERROR_TOTAL,
            "chain_id" => chain_id.to_string(),
            "method" => Self::CROSS_SAFE_METHOD_UPDATE,
        )
        .increment(0);

        metrics::histogram!(
            Self::CROSS_SAFE_UPDATE_DURATION_SECONDS,
            "chain_id" => chain_id.to_string(),
            "method" => Self::CROSS_SAFE_METHOD_UPDATE,
        )
        .record(0.0);

        metrics::histogram!(Self::CROSS_SAFE_HAZARD_BLOCKS, "chain_id" => chain_id.to_string())
            .record(0.0);
        metrics::counter!(Self::CROSS_SAFE_CYCLES_TOTAL, "chain_id" => chain_id.to_string())
            .increment(0);
        metrics::counter!(Self::CROSS_SAFE_INVALIDATED_TOTAL, "chain_id" => chain_id.to_string())
            .increment(0);
    }

    pub(crate) fn record_hazards(chain_id: ChainId, count: usize) {
        metrics::histogram!(Self::CROSS_SAFE_HAZARD_BLOCKS, "chain_id" => chain_id.to_string())
            .record(count as f64);
    }

    pub(crate) fn record_cycle(chain_id: ChainId) {
        metrics::counter!(Self::CROSS_SAFE_CYCLES_TOTAL, "chain_id" => chain_id.to_string())
            .increment(1);
    }

    pub(crate) fn record_invalidated(chain_id: ChainId, count: usize) {
        metrics::counter!(Self::CROSS_SAFE_INVALIDATED_TOTAL, "chain_id" => chain_id.to_string())
            .increment(count as u64);
    }
}
