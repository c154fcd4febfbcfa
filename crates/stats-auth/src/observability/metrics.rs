//! Metrics definitions for stats token authentication.
//!
//! All metrics follow Prometheus naming conventions:
//! - `stats_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: success, error
//! - `error_type`: one value per `StatsAuthError` variant
//! - `outcome`: hit, miss
//! - directory `status`: found, not_found, unavailable
//!
//! Issuers and key ids are never used as labels.

use crate::errors::StatsAuthError;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Token validation is on the request path; most of it is one
        // signature check plus a cache hit
        .set_buckets_for_metric(
            Matcher::Prefix("stats_auth_token_validation".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of one `authenticate` call.
///
/// Metric: `stats_auth_token_validations_total`, `stats_auth_token_validation_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_token_validation<T>(result: &Result<T, StatsAuthError>, duration: Duration) {
    let (status, error_type) = match result {
        Ok(_) => ("success", "none"),
        Err(e) => ("error", e.kind()),
    };

    histogram!("stats_auth_token_validation_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!(
        "stats_auth_token_validations_total",
        "status" => status,
        "error_type" => error_type
    )
    .increment(1);
}

// ============================================================================
// Health Authority Cache Metrics
// ============================================================================

/// Record a resolution cache lookup.
///
/// Metric: `stats_auth_ha_cache_lookups_total`
/// Labels: `outcome` (`hit` or `miss`)
pub fn record_ha_cache_lookup(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("stats_auth_ha_cache_lookups_total", "outcome" => outcome).increment(1);
}

/// Record a directory round-trip made on a cache miss.
///
/// Metric: `stats_auth_directory_lookups_total`
/// Labels: `status` (`found`, `not_found`, `unavailable`)
pub fn record_directory_lookup(status: &'static str) {
    counter!("stats_auth_directory_lookups_total", "status" => status).increment(1);
}
