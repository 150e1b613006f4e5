use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use recon_core::error::AppError;
use serde::Deserialize;
use validator::Validate;

use crate::models::{Tenant, Vendor};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>), AppError> {
    payload.validate()?;
    let tenant = state.db.create_tenant(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<Tenant>>, AppError> {
    Ok(Json(state.db.list_tenants().await?))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state
        .db
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;
    Ok(Json(tenant))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.db.delete_tenant(tenant_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Tenant not found")))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVendorRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

pub async fn create_vendor(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Json(payload): Json<CreateVendorRequest>,
) -> Result<(StatusCode, Json<Vendor>), AppError> {
    payload.validate()?;
    state
        .db
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;
    let vendor = state.db.create_vendor(tenant_id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(vendor)))
}

pub async fn list_vendors(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
) -> Result<Json<Vec<Vendor>>, AppError> {
    Ok(Json(state.db.list_vendors(tenant_id).await?))
}
