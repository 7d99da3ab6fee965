use metrics::Label;
use std::time::Duration;

/// Records the outcome and latency of a single call.
///
/// `labels` are attached to every series in addition to the `method` label. Prefer the
/// [`observe_metrics_for_result!`](crate::observe_metrics_for_result) macros, which time the
/// call and build the labels.
pub fn record_call(
    success_metric: &'static str,
    error_metric: &'static str,
    duration_metric: &'static str,
    method: &'static str,
    is_ok: bool,
    elapsed: Duration,
    mut labels: Vec<Label>,
) {
    labels.push(Label::new("method", method));

    let outcome = if is_ok { success_metric } else { error_metric };
    metrics::counter!(outcome, labels.clone()).increment(1);
    metrics::histogram!(duration_metric, labels).record(elapsed.as_secs_f64());
}

/// Observes a fallible call, recording success/error counters and its duration.
#[macro_export]
macro_rules! observe_metrics_for_result {
    (
        $success_metric:expr,
        $error_metric:expr,
        $duration_metric:expr,
        $method_name:expr,
        $block:expr $(, $tag_key:expr => $tag_val:expr )* $(,)?
    ) => {{
        let start_time = std::time::Instant::now();
        let result = $block;
        $crate::record_call(
            $success_metric,
            $error_metric,
            $duration_metric,
            $method_name,
            result.is_ok(),
            start_time.elapsed(),
            vec![$( $crate::Label::new($tag_key, $tag_val) ),*],
        );
        result
    }};
}

/// Same as [`observe_metrics_for_result!`] for a future; the macro awaits it.
#[macro_export]
macro_rules! observe_metrics_for_result_async {
    (
        $success_metric:expr,
        $error_metric:expr,
        $duration_metric:expr,
        $method_name:expr,
        $block:expr $(, $tag_key:expr => $tag_val:expr )* $(,)?
    ) => {{
        let start_time = std::time::Instant::now();
        let result = $block.await;
        $crate::record_call(
            $success_metric,
            $error_metric,
            $duration_metric,
            $method_name,
            result.is_ok(),
            start_time.elapsed(),
            vec![$( $crate::Label::new($tag_key, $tag_val) ),*],
        );
        result
    }};
}
