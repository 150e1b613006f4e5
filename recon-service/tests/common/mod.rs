//! Common test utilities for recon-service integration tests.

use recon_core::config::Config as CommonConfig;
use recon_service::config::{AiConfig, DatabaseConfig, ReconConfig};
use recon_service::startup::Application;
use serde_json::{json, Value};
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,recon_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(db_dir: &TempDir, ai_provider: &str) -> ReconConfig {
    let db_path = db_dir.path().join("recon_test.db");

    ReconConfig {
        common: CommonConfig { port: 0 },
        service_name: "recon-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 2,
            min_connections: 1,
        },
        ai: AiConfig {
            provider: ai_provider.to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            timeout_seconds: 1.0,
        },
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    db_dir: TempDir,
}

/// Spawn a test application with the AI provider disabled.
#[allow(dead_code)]
pub async fn spawn_app() -> TestApp {
    spawn_app_with_ai("disabled").await
}

/// Spawn a test application with the given AI provider.
#[allow(dead_code)]
pub async fn spawn_app_with_ai(ai_provider: &str) -> TestApp {
    init_tracing();

    let db_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&db_dir, ai_provider);

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.port());

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        db_dir,
    }
}

/// Create a tenant and return its id.
#[allow(dead_code)]
pub async fn create_tenant(app: &TestApp, name: &str) -> i64 {
    let response = app
        .client
        .post(format!("{}/tenants", app.address))
        .json(&json!({"name": name}))
        .send()
        .await
        .expect("Failed to create tenant");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Invalid tenant body");
    body["id"].as_i64().expect("Tenant id missing")
}

/// Create an invoice and return its id.
#[allow(dead_code)]
pub async fn create_invoice(app: &TestApp, tenant_id: i64, payload: Value) -> i64 {
    let response = app
        .client
        .post(format!("{}/tenants/{}/invoices", app.address, tenant_id))
        .json(&payload)
        .send()
        .await
        .expect("Failed to create invoice");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Invalid invoice body");
    body["id"].as_i64().expect("Invoice id missing")
}

/// Import transactions under the given idempotency key, expecting success.
#[allow(dead_code)]
pub async fn import_transactions(app: &TestApp, tenant_id: i64, key: &str, payload: Value) -> Value {
    let response = app
        .client
        .post(format!(
            "{}/tenants/{}/bank-transactions/import",
            app.address, tenant_id
        ))
        .header("Idempotency-Key", key)
        .json(&payload)
        .send()
        .await
        .expect("Failed to import transactions");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid import body")
}
