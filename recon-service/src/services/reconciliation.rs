//! Reconciliation engine: candidate generation and match confirmation.

use recon_core::error::AppError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::models::{Invoice, InvoiceStatus, Match, MatchStatus};
use crate::services::database::{Database, InvoiceFilters, TransactionFilters};
use crate::services::metrics::{record_error, record_reconciliation_operation};
use crate::services::scoring::{compute_score, DEFAULT_AMOUNT_TOLERANCE_RATIO};

fn default_max_candidates() -> u32 {
    3
}

fn default_date_window() -> u32 {
    3
}

/// Parameters for a reconciliation run.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReconcileParams {
    #[serde(default = "default_max_candidates")]
    #[validate(range(min = 1, max = 10))]
    pub max_candidates_per_invoice: u32,
    #[serde(default = "default_date_window")]
    #[validate(range(min = 0, max = 30))]
    pub date_window_days: u32,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            max_candidates_per_invoice: default_max_candidates(),
            date_window_days: default_date_window(),
        }
    }
}

/// Scores open invoices against bank transactions and manages the match
/// lifecycle for a tenant.
pub struct ReconciliationService {
    db: Arc<Database>,
}

impl ReconciliationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Recompute the speculative match set for a tenant.
    ///
    /// Non-confirmed matches are discarded and rebuilt from the current open
    /// invoices; confirmed matches are left untouched. Candidates are ranked
    /// by score descending with transaction id ascending as the tie-break,
    /// and only matches created by this run are returned.
    #[instrument(skip(self, params), fields(tenant_id = %tenant_id))]
    pub async fn reconcile(
        &self,
        tenant_id: i64,
        params: &ReconcileParams,
    ) -> Result<Vec<Match>, AppError> {
        let open_invoices = self
            .db
            .list_invoices(
                tenant_id,
                &InvoiceFilters {
                    status: Some(InvoiceStatus::Open),
                    ..Default::default()
                },
            )
            .await?;
        let transactions = self
            .db
            .list_transactions(tenant_id, &TransactionFilters::default())
            .await?;

        // Score every open invoice against every transaction up front; the
        // delete + insert below is the only write and stays transactional.
        let mut planned: Vec<(&Invoice, Vec<(i64, f64)>)> = Vec::with_capacity(open_invoices.len());
        for invoice in &open_invoices {
            let mut candidates: Vec<(i64, f64)> = transactions
                .iter()
                .filter_map(|txn| {
                    let breakdown = compute_score(
                        invoice.amount,
                        invoice.invoice_date,
                        invoice.description.as_deref(),
                        txn.amount,
                        txn.posted_at,
                        txn.description.as_deref(),
                        params.date_window_days,
                        DEFAULT_AMOUNT_TOLERANCE_RATIO,
                    );
                    (breakdown.total > 0.0).then_some((txn.id, breakdown.total))
                })
                .collect();

            candidates.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            candidates.truncate(params.max_candidates_per_invoice as usize);
            planned.push((invoice, candidates));
        }

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            record_error("database_error");
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("DELETE FROM matches WHERE tenant_id = ? AND status != ?")
            .bind(tenant_id)
            .bind(MatchStatus::Confirmed.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                record_error("database_error");
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear proposed matches: {}", e))
            })?;

        let now = chrono::Utc::now();
        let mut created: Vec<Match> = Vec::new();
        for (invoice, candidates) in planned {
            for (txn_id, score) in candidates {
                let row = sqlx::query_as::<_, Match>(
                    r#"
                    INSERT INTO matches
                        (tenant_id, invoice_id, bank_transaction_id, score, status, created_utc)
                    VALUES (?, ?, ?, ?, ?, ?)
                    RETURNING id, tenant_id, invoice_id, bank_transaction_id, score, status, created_utc
                    "#,
                )
                .bind(tenant_id)
                .bind(invoice.id)
                .bind(txn_id)
                .bind(score)
                .bind(MatchStatus::Proposed.as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    record_error("database_error");
                    AppError::DatabaseError(anyhow::anyhow!("Failed to create match: {}", e))
                })?;
                created.push(row);
            }
        }

        tx.commit().await.map_err(|e| {
            record_error("database_error");
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit reconcile: {}", e))
        })?;

        record_reconciliation_operation("reconcile", "success");
        info!(
            open_invoices = open_invoices.len(),
            transactions = transactions.len(),
            proposed = created.len(),
            "Reconciliation run complete"
        );

        Ok(created)
    }

    /// Confirm a proposed match.
    ///
    /// Sets the match to `confirmed`, the invoice to `matched`, and removes
    /// competing proposed matches that touch the same invoice or transaction,
    /// all in one transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, match_id = %match_id))]
    pub async fn confirm_match(&self, tenant_id: i64, match_id: i64) -> Result<Match, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            record_error("database_error");
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let found = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, tenant_id, invoice_id, bank_transaction_id, score, status, created_utc
            FROM matches
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(match_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get match: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Match not found")))?;

        if MatchStatus::parse(&found.status) != Some(MatchStatus::Proposed) {
            record_reconciliation_operation("confirm", "invalid_state");
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Only proposed matches can be confirmed"
            )));
        }

        // At most one confirmed match per invoice and per transaction.
        let conflict: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM matches
            WHERE tenant_id = ? AND status = ?
              AND (invoice_id = ? OR bank_transaction_id = ?)
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(MatchStatus::Confirmed.as_str())
        .bind(found.invoice_id)
        .bind(found.bank_transaction_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check conflicts: {}", e)))?;

        if conflict.is_some() {
            record_reconciliation_operation("confirm", "conflict");
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice or transaction already has a confirmed match"
            )));
        }

        let confirmed = sqlx::query_as::<_, Match>(
            r#"
            UPDATE matches SET status = ?
            WHERE tenant_id = ? AND id = ?
            RETURNING id, tenant_id, invoice_id, bank_transaction_id, score, status, created_utc
            "#,
        )
        .bind(MatchStatus::Confirmed.as_str())
        .bind(tenant_id)
        .bind(match_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to confirm match: {}", e)))?;

        sqlx::query("UPDATE invoices SET status = ? WHERE tenant_id = ? AND id = ?")
            .bind(InvoiceStatus::Matched.as_str())
            .bind(tenant_id)
            .bind(confirmed.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e))
            })?;

        // Competing proposals for either side are invalid once one is claimed.
        sqlx::query(
            r#"
            DELETE FROM matches
            WHERE tenant_id = ? AND status = ? AND id != ?
              AND (invoice_id = ? OR bank_transaction_id = ?)
            "#,
        )
        .bind(tenant_id)
        .bind(MatchStatus::Proposed.as_str())
        .bind(match_id)
        .bind(confirmed.invoice_id)
        .bind(confirmed.bank_transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to prune proposed matches: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            record_error("database_error");
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit confirmation: {}", e))
        })?;

        record_reconciliation_operation("confirm", "success");
        info!(
            invoice_id = %confirmed.invoice_id,
            bank_transaction_id = %confirmed.bank_transaction_id,
            "Match confirmed"
        );

        Ok(confirmed)
    }
}
