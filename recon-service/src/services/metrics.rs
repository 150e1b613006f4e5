//! Prometheus metrics for recon-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recon_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for reconciliation operations.
pub static RECONCILIATION_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_reconciliation_operations_total",
        "Total number of reconciliation operations",
        &["operation", "status"]
    )
    .expect("Failed to register RECONCILIATION_OPERATIONS")
});

/// Counter for transaction imports.
pub static TRANSACTION_IMPORTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_transaction_imports_total",
        "Total number of transaction import requests",
        &["status"]
    )
    .expect("Failed to register TRANSACTION_IMPORTS")
});

/// Counter for AI explanation calls.
pub static AI_EXPLANATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_ai_explanations_total",
        "Total number of match explanations",
        &["source"]
    )
    .expect("Failed to register AI_EXPLANATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "recon_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RECONCILIATION_OPERATIONS);
    Lazy::force(&TRANSACTION_IMPORTS);
    Lazy::force(&AI_EXPLANATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Record a reconciliation operation.
pub fn record_reconciliation_operation(operation: &str, status: &str) {
    RECONCILIATION_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a transaction import request.
pub fn record_transaction_import(status: &str) {
    TRANSACTION_IMPORTS.with_label_values(&[status]).inc();
}

/// Record a match explanation, labelled by whether AI or the fallback answered.
pub fn record_ai_explanation(source: &str) {
    AI_EXPLANATIONS.with_label_values(&[source]).inc();
}
