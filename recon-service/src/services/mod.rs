//! Services module for recon-service.

pub mod ai;
pub mod database;
pub mod explain;
pub mod idempotency;
pub mod importer;
pub mod metrics;
pub mod reconciliation;
pub mod scoring;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_ai_explanation, record_error,
    record_reconciliation_operation, record_transaction_import,
};
