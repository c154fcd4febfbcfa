//! Observability for stats token authentication.

pub mod metrics;

pub use metrics::init_metrics_recorder;
