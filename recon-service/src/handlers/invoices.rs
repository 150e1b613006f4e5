use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use recon_core::error::AppError;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::{Invoice, InvoiceStatus};
use crate::services::database::{InvoiceFilters, NewInvoice};
use crate::startup::AppState;

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub vendor_id: Option<i64>,
    #[validate(length(max = 64))]
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    pub invoice_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    pub vendor_id: Option<i64>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    payload.validate()?;
    state
        .db
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    let invoice = state
        .db
        .create_invoice(
            tenant_id,
            &NewInvoice {
                vendor_id: payload.vendor_id,
                invoice_number: payload.invoice_number,
                amount: payload.amount,
                currency: payload.currency,
                invoice_date: payload.invoice_date,
                description: payload.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            InvoiceStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown invoice status: {}", raw)))?,
        ),
        None => None,
    };

    let invoices = state
        .db
        .list_invoices(
            tenant_id,
            &InvoiceFilters {
                status,
                vendor_id: query.vendor_id,
                date_start: query.date_start,
                date_end: query.date_end,
                amount_min: query.amount_min,
                amount_max: query.amount_max,
            },
        )
        .await?;
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path((tenant_id, invoice_id)): Path<(i64, i64)>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .get_invoice(tenant_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Path((tenant_id, invoice_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if state.db.delete_invoice(tenant_id, invoice_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }
}
