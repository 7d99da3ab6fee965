/// Defines a contract for types that can report metrics.
///
/// Implemented by components whose state is sampled rather than recorded as it changes,
/// e.g. entry counts of every open database.
pub trait MetricsReporter {
    /// Samples the current state and reports it to the configured metrics backend.
    fn report_metrics(&self);
}
