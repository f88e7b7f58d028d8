//! Metrics definitions for token authorization.
//!
//! All metrics follow Prometheus naming conventions:
//! - `authz_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! Only the `metrics` facade is used here. Installing a recorder and serving
//! the scrape endpoint belongs to the embedding service; without a recorder
//! every call is a no-op.
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: "success" plus one value per `AuthzError` variant
//! - `status`: 2 values (success, error)
//! - `error_type`: bounded by `FetchError` variants

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of a single token validation.
///
/// Metric: `authz_token_validations_total`
/// Labels: `outcome`
///
/// # Arguments
///
/// * `outcome` - "success" or the `error_type()` of the rejection
pub fn record_token_validation(outcome: &str) {
    counter!("authz_token_validations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS fetch attempt.
///
/// Emits:
/// - `authz_jwks_fetch_total` counter (labels: `status`)
/// - `authz_jwks_fetch_duration_seconds` histogram (no labels)
/// - `authz_jwks_fetch_failures_total` counter (labels: `error_type`, on failure only)
///
/// # Arguments
///
/// * `status` - "success" or "error"
/// * `error_type` - `FetchError::error_type()` for failures
/// * `duration` - Wall time of the fetch, including cancellation
pub fn record_jwks_fetch(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("authz_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("authz_jwks_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(err_type) = error_type {
        counter!("authz_jwks_fetch_failures_total",
            "error_type" => err_type.to_string()
        )
        .increment(1);
    }
}

/// Set the number of keys in the currently published key set.
///
/// Metric: `authz_jwks_keys`
pub fn set_jwks_key_count(count: usize) {
    gauge!("authz_jwks_keys").set(count as f64);
}
