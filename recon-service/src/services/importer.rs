//! Idempotent bulk import of bank transactions.

use chrono::{DateTime, Utc};
use recon_core::error::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::models::{amount_to_minor, IdempotencyRecord};
use crate::services::database::Database;
use crate::services::idempotency::request_fingerprint;
use crate::services::metrics::{record_error, record_transaction_import, DB_QUERY_DURATION};

fn default_currency() -> String {
    "USD".to_string()
}

/// One transaction row in an import request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BankTransactionIn {
    pub external_id: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    pub description: Option<String>,
}

/// Outcome of an import request. Serialized verbatim into the idempotency
/// ledger so replays return the original response byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub inserted: u32,
    pub skipped: u32,
    pub created_ids: Vec<i64>,
}

/// Bulk-inserts bank transactions behind the idempotency guard.
pub struct ImportService {
    db: Arc<Database>,
}

impl ImportService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Import transactions for a tenant.
    ///
    /// Replaying the same `(tenant, key, payload)` returns the recorded
    /// response without writing; reusing the key with a different payload is
    /// an idempotency conflict. New rows and the idempotency record commit in
    /// a single transaction.
    #[instrument(skip(self, rows), fields(tenant_id = %tenant_id, rows = rows.len()))]
    pub async fn import(
        &self,
        tenant_id: i64,
        rows: &[BankTransactionIn],
        idempotency_key: &str,
    ) -> Result<ImportOutcome, AppError> {
        if idempotency_key.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Idempotency-Key header is required"
            )));
        }

        let fingerprint = request_fingerprint(&rows)?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["import_transactions"])
            .start_timer();

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT id, tenant_id, key, request_hash, response_json, created_utc
            FROM idempotency_records
            WHERE tenant_id = ? AND key = ?
            "#,
        )
        .bind(tenant_id)
        .bind(idempotency_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read idempotency record: {}", e))
        })?;

        if let Some(record) = existing {
            if record.request_hash != fingerprint {
                record_transaction_import("conflict");
                return Err(AppError::IdempotencyConflict(anyhow::anyhow!(
                    "Idempotency key reused with different payload"
                )));
            }
            let replay: ImportOutcome = serde_json::from_str(&record.response_json).map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Corrupt idempotency record: {}", e))
            })?;
            timer.observe_duration();
            record_transaction_import("replayed");
            info!(key = %idempotency_key, "Import replayed from idempotency record");
            return Ok(replay);
        }

        let mut inserted = 0u32;
        let mut skipped = 0u32;
        let mut created_ids: Vec<i64> = Vec::new();
        let now = Utc::now();

        for row in rows {
            let amount_minor = amount_to_minor(row.amount)
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

            // INSERT OR IGNORE dedupes on (tenant_id, external_id); rows
            // without a natural key always insert.
            let result = if row.external_id.is_some() {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO bank_transactions
                        (tenant_id, external_id, posted_at, amount_minor, currency, description, created_utc)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO bank_transactions
                        (tenant_id, external_id, posted_at, amount_minor, currency, description, created_utc)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
            }
            .bind(tenant_id)
            .bind(&row.external_id)
            .bind(row.posted_at)
            .bind(amount_minor)
            .bind(&row.currency)
            .bind(&row.description)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                record_error("database_error");
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert transaction: {}", e))
            })?;

            if result.rows_affected() == 1 {
                inserted += 1;
                created_ids.push(result.last_insert_rowid());
            } else {
                skipped += 1;
            }
        }

        let outcome = ImportOutcome {
            inserted,
            skipped,
            created_ids,
        };
        let response_json = serde_json::to_string(&outcome).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to serialize response: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO idempotency_records (tenant_id, key, request_hash, response_json, created_utc)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(idempotency_key)
        .bind(&fingerprint)
        .bind(&response_json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Concurrent import with the same key"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to record idempotency key: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit import: {}", e))
        })?;

        timer.observe_duration();
        record_transaction_import("imported");
        info!(
            inserted = inserted,
            skipped = skipped,
            key = %idempotency_key,
            "Bank transactions imported"
        );

        Ok(outcome)
    }
}
