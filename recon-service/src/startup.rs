//! Application startup and lifecycle management.

use crate::config::ReconConfig;
use crate::handlers::{bank_transactions, invoices, reconcile, tenants};
use crate::services::ai::{build_provider, ExplainProvider};
use crate::services::{get_metrics, init_metrics, Database};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use recon_core::error::AppError;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ReconConfig,
    pub db: Arc<Database>,
    pub ai: Arc<dyn ExplainProvider>,
    pub ai_timeout: Duration,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "recon-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "recon-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReconConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let ai = build_provider(&config.ai)?;
        let ai_timeout = Duration::from_secs_f64(config.ai.timeout_seconds);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to bind {}: {}", addr, e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to read local addr: {}", e)))?
            .port();

        let state = AppState {
            config,
            db: Arc::new(db),
            ai,
            ai_timeout,
        };

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// The port the HTTP server is bound to (useful with port 0 in tests).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the HTTP server until it is stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = api_router(self.state);
        tracing::info!(port = %self.port, "HTTP server listening");
        axum::serve(self.listener, router).await
    }
}

fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/tenants", post(tenants::create_tenant).get(tenants::list_tenants))
        .route(
            "/tenants/:tenant_id",
            get(tenants::get_tenant).delete(tenants::delete_tenant),
        )
        .route(
            "/tenants/:tenant_id/vendors",
            post(tenants::create_vendor).get(tenants::list_vendors),
        )
        .route(
            "/tenants/:tenant_id/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/tenants/:tenant_id/invoices/:invoice_id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route(
            "/tenants/:tenant_id/bank-transactions",
            get(bank_transactions::list_transactions),
        )
        .route(
            "/tenants/:tenant_id/bank-transactions/import",
            post(bank_transactions::import_transactions),
        )
        .route("/tenants/:tenant_id/reconcile", post(reconcile::reconcile))
        .route(
            "/tenants/:tenant_id/reconcile/explain",
            get(reconcile::explain_match),
        )
        .route("/tenants/:tenant_id/matches", get(reconcile::list_matches))
        .route(
            "/tenants/:tenant_id/matches/:match_id/confirm",
            post(reconcile::confirm_match),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
