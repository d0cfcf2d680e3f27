//! # Utility Modules
//!
//! - **Logging**: tracing subscriber setup driven by [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: process-wide atomic counters

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
