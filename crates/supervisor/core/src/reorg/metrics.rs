use alloy_primitives::ChainId;

/// Metrics for rewind operations
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const SUPERVISOR_REWIND_SUCCESS_TOTAL: &'static str =
        "supervisor_rewind_success_total";
    pub(crate) const SUPERVISOR_REWIND_ERROR_TOTAL: &'static str = "supervisor_rewind_error_total";
    pub(crate) const SUPERVISOR_REWIND_DURATION_SECONDS: &'static str =
        "supervisor_rewind_duration_seconds";
    pub(crate) const SUPERVISOR_REWIND_METHOD_CHAIN_REORG: &'static str = "chain_reorg";
    pub(crate) const SUPERVISOR_REWIND_METHOD_LOCAL_DERIVED: &'static str = "local_derived";
    pub(crate) const SUPERVISOR_REWIND_DEPTH: &'static str = "supervisor_rewind_depth";

    const METHODS: [&'static str; 2] =
        [Self::SUPERVISOR_REWIND_METHOD_CHAIN_REORG, Self::SUPERVISOR_REWIND_METHOD_LOCAL_DERIVED];

    pub(crate) fn init(chain_id: ChainId) {
        Self::describe();
        Self::zero(chain_id);
    }

    fn describe() {
        metrics::describe_counter!(
            Self::SUPERVISOR_REWIND_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Total number of successfully processed rewind requests",
        );

        metrics::describe_counter!(
            Self::SUPERVISOR_REWIND_ERROR_TOTAL,
            metrics::Unit::Count,
            "Total number of errors encountered while processing rewind requests",
        );

        metrics::describe_histogram!(
            Self::SUPERVISOR_REWIND_DEPTH,
            metrics::Unit::Count,
            "Number of local-unsafe blocks dropped by a rewind",
        );

        metrics::describe_histogram!(
            Self::SUPERVISOR_REWIND_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Latency for processing rewind requests",
        );
    }

    fn zero(chain_id: ChainId) {
        for method in Self::METHODS {
            metrics::counter!(
                Self::SUPERVISOR_REWIND_SUCCESS_TOTAL,
                "chain_id" => chain_id.to_string(),
                "method" => method,
            )
            .increment(0);

            metrics::counter!(
                Self::SUPERVISOR_REWIND_ERROR_TOTAL,
                "chain_id" => chain_id.to_string(),
                "method" => method,
            )
            .increment(0);

            metrics::histogram!(
                Self::SUPERVISOR_REWIND_DURATION_SECONDS,
                "chain_id" => chain_id.to_string(),
                "method" => method,
            )
            .record(0.0);
        }

        metrics::histogram!(Self::SUPERVISOR_REWIND_DEPTH, "chain_id" => chain_id.to_string())
            .record(0);
    }

    pub(crate) fn record_depth(chain_id: ChainId, depth: u64) {
        metrics::histogram!(Self::SUPERVISOR_REWIND_DEPTH, "chain_id" => chain_id.to_string())
            .record(depth as f64);
    }
}
