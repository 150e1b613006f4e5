use axum::{
    extract::{Path, Query, State},
    Json,
};
use recon_core::error::AppError;
use serde::Deserialize;
use validator::Validate;

use crate::models::{Match, MatchStatus};
use crate::services::explain::{Explanation, ExplanationService};
use crate::services::reconciliation::{ReconcileParams, ReconciliationService};
use crate::startup::AppState;

pub async fn reconcile(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    payload: Option<Json<ReconcileParams>>,
) -> Result<Json<Vec<Match>>, AppError> {
    let params = payload.map(|Json(p)| p).unwrap_or_default();
    params.validate()?;

    state
        .db
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    let matches = ReconciliationService::new(state.db.clone())
        .reconcile(tenant_id, &params)
        .await?;
    Ok(Json(matches))
}

pub async fn confirm_match(
    State(state): State<AppState>,
    Path((tenant_id, match_id)): Path<(i64, i64)>,
) -> Result<Json<Match>, AppError> {
    let confirmed = ReconciliationService::new(state.db.clone())
        .confirm_match(tenant_id, match_id)
        .await?;
    Ok(Json(confirmed))
}

#[derive(Debug, Deserialize)]
pub struct ListMatchesQuery {
    pub status: Option<String>,
}

pub async fn list_matches(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            MatchStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown match status: {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.db.list_matches(tenant_id, status).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub invoice_id: i64,
    pub transaction_id: i64,
}

pub async fn explain_match(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<ExplainQuery>,
) -> Result<Json<Explanation>, AppError> {
    let explanation = ExplanationService::new(state.db.clone(), state.ai.clone(), state.ai_timeout)
        .explain(tenant_id, query.invoice_id, query.transaction_id)
        .await?;
    Ok(Json(explanation))
}
