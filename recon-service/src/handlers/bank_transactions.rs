use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use recon_core::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::BankTransaction;
use crate::services::database::TransactionFilters;
use crate::services::importer::{BankTransactionIn, ImportOutcome, ImportService};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub posted_start: Option<DateTime<Utc>>,
    pub posted_end: Option<DateTime<Utc>>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub description_contains: Option<String>,
}

pub async fn import_transactions(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<Vec<BankTransactionIn>>,
) -> Result<Json<ImportOutcome>, AppError> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Idempotency-Key header is required"))
        })?;

    for row in &payload {
        row.validate()?;
    }

    state
        .db
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    let outcome = ImportService::new(state.db.clone())
        .import(tenant_id, &payload, idempotency_key)
        .await?;
    Ok(Json(outcome))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<BankTransaction>>, AppError> {
    let transactions = state
        .db
        .list_transactions(
            tenant_id,
            &TransactionFilters {
                posted_start: query.posted_start,
                posted_end: query.posted_end,
                amount_min: query.amount_min,
                amount_max: query.amount_max,
                description_contains: query.description_contains,
            },
        )
        .await?;
    Ok(Json(transactions))
}
