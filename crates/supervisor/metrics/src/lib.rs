//! Metrics helpers shared by the supervisor crates.

mod macros;
pub use macros::record_call;

#[doc(hidden)]
pub use metrics::Label;

mod reporter;
pub use reporter::MetricsReporter;
