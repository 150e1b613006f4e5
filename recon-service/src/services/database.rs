//! Database service for recon-service.

use crate::models::{
    amount_to_minor, BankTransaction, Invoice, InvoiceStatus, Match, MatchStatus, Tenant, Vendor,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, NaiveDate, Utc};
use recon_core::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Invoice creation payload, already validated by the transport layer.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub vendor_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub invoice_date: Option<NaiveDate>,
    pub description: Option<String>,
}

/// Filters for invoice listing. All predicates are ANDed together.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilters {
    pub status: Option<InvoiceStatus>,
    pub vendor_id: Option<i64>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
}

/// Filters for bank transaction listing.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilters {
    pub posted_start: Option<DateTime<Utc>>,
    pub posted_end: Option<DateTime<Utc>>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub description_contains: Option<String>,
}

fn bound_to_minor(amount: Decimal) -> i64 {
    (amount * Decimal::from(100)).to_i64().unwrap_or(i64::MAX)
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "recon-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Tenant Operations
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn create_tenant(&self, name: &str) -> Result<Tenant, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tenant"])
            .start_timer();

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, created_utc)
            VALUES (?, ?)
            RETURNING id, name, created_utc
            "#,
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Tenant name already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create tenant: {}", e)),
        })?;

        timer.observe_duration();
        info!(tenant_id = %tenant.id, "Tenant created");

        Ok(tenant)
    }

    #[instrument(skip(self))]
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tenants"])
            .start_timer();

        let tenants = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, created_utc FROM tenants ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tenants: {}", e)))?;

        timer.observe_duration();

        Ok(tenants)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_tenant(&self, tenant_id: i64) -> Result<Option<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tenant"])
            .start_timer();

        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, name, created_utc FROM tenants WHERE id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tenant: {}", e)))?;

        timer.observe_duration();

        Ok(tenant)
    }

    /// Delete a tenant. Vendors, invoices, transactions, matches, and
    /// idempotency records go with it via cascade.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn delete_tenant(&self, tenant_id: i64) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_tenant"])
            .start_timer();

        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete tenant: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Vendor Operations
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn create_vendor(&self, tenant_id: i64, name: &str) -> Result<Vendor, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_vendor"])
            .start_timer();

        let vendor = sqlx::query_as::<_, Vendor>(
            r#"
            INSERT INTO vendors (tenant_id, name, created_utc)
            VALUES (?, ?, ?)
            RETURNING id, tenant_id, name, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Vendor name already exists for tenant"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create vendor: {}", e)),
        })?;

        timer.observe_duration();

        Ok(vendor)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_vendors(&self, tenant_id: i64) -> Result<Vec<Vendor>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_vendors"])
            .start_timer();

        let vendors = sqlx::query_as::<_, Vendor>(
            "SELECT id, tenant_id, name, created_utc FROM vendors WHERE tenant_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list vendors: {}", e)))?;

        timer.observe_duration();

        Ok(vendors)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    #[instrument(skip(self, invoice), fields(tenant_id = %tenant_id))]
    pub async fn create_invoice(
        &self,
        tenant_id: i64,
        invoice: &NewInvoice,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let amount_minor = amount_to_minor(invoice.amount)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        let created = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices
                (tenant_id, vendor_id, invoice_number, amount_minor, currency, invoice_date, description, status, created_utc)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, tenant_id, vendor_id, invoice_number, amount_minor, currency, invoice_date, description, status, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(invoice.vendor_id)
        .bind(&invoice.invoice_number)
        .bind(amount_minor)
        .bind(&invoice.currency)
        .bind(invoice.invoice_date)
        .bind(&invoice.description)
        .bind(InvoiceStatus::Open.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::BadRequest(anyhow::anyhow!("Unknown tenant or vendor"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        timer.observe_duration();
        info!(invoice_id = %created.id, "Invoice created");

        Ok(created)
    }

    #[instrument(skip(self, filters), fields(tenant_id = %tenant_id))]
    pub async fn list_invoices(
        &self,
        tenant_id: i64,
        filters: &InvoiceFilters,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, tenant_id, vendor_id, invoice_number, amount_minor, currency, \
             invoice_date, description, status, created_utc FROM invoices WHERE tenant_id = ",
        );
        query.push_bind(tenant_id);

        if let Some(status) = filters.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(vendor_id) = filters.vendor_id {
            query.push(" AND vendor_id = ").push_bind(vendor_id);
        }
        if let Some(start) = filters.date_start {
            query.push(" AND invoice_date >= ").push_bind(start);
        }
        if let Some(end) = filters.date_end {
            query.push(" AND invoice_date <= ").push_bind(end);
        }
        if let Some(min) = filters.amount_min {
            query.push(" AND amount_minor >= ").push_bind(bound_to_minor(min));
        }
        if let Some(max) = filters.amount_max {
            query.push(" AND amount_minor <= ").push_bind(bound_to_minor(max));
        }
        query.push(" ORDER BY id");

        let invoices = query
            .build_query_as::<Invoice>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: i64,
        invoice_id: i64,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, tenant_id, vendor_id, invoice_number, amount_minor, currency,
                   invoice_date, description, status, created_utc
            FROM invoices
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Delete an invoice; its matches cascade away with it.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, tenant_id: i64, invoice_id: i64) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoices WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Bank Transaction Operations
    // =========================================================================

    #[instrument(skip(self, filters), fields(tenant_id = %tenant_id))]
    pub async fn list_transactions(
        &self,
        tenant_id: i64,
        filters: &TransactionFilters,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, tenant_id, external_id, posted_at, amount_minor, currency, \
             description, created_utc FROM bank_transactions WHERE tenant_id = ",
        );
        query.push_bind(tenant_id);

        if let Some(start) = filters.posted_start {
            query.push(" AND posted_at >= ").push_bind(start);
        }
        if let Some(end) = filters.posted_end {
            query.push(" AND posted_at <= ").push_bind(end);
        }
        if let Some(min) = filters.amount_min {
            query.push(" AND amount_minor >= ").push_bind(bound_to_minor(min));
        }
        if let Some(max) = filters.amount_max {
            query.push(" AND amount_minor <= ").push_bind(bound_to_minor(max));
        }
        if let Some(needle) = &filters.description_contains {
            query
                .push(" AND LOWER(description) LIKE ")
                .push_bind(format!("%{}%", needle.to_lowercase()));
        }
        query.push(" ORDER BY id");

        let transactions = query
            .build_query_as::<BankTransaction>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
            })?;

        timer.observe_duration();

        Ok(transactions)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn get_bank_transaction(
        &self,
        tenant_id: i64,
        transaction_id: i64,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bank_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT id, tenant_id, external_id, posted_at, amount_minor, currency,
                   description, created_utc
            FROM bank_transactions
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get transaction: {}", e)))?;

        timer.observe_duration();

        Ok(transaction)
    }

    // =========================================================================
    // Match Operations
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_matches(
        &self,
        tenant_id: i64,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_matches"])
            .start_timer();

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, tenant_id, invoice_id, bank_transaction_id, score, status, created_utc \
             FROM matches WHERE tenant_id = ",
        );
        query.push_bind(tenant_id);
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY id");

        let matches = query
            .build_query_as::<Match>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list matches: {}", e)))?;

        timer.observe_duration();

        Ok(matches)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, match_id = %match_id))]
    pub async fn get_match(&self, tenant_id: i64, match_id: i64) -> Result<Option<Match>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_match"])
            .start_timer();

        let found = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, tenant_id, invoice_id, bank_transaction_id, score, status, created_utc
            FROM matches
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get match: {}", e)))?;

        timer.observe_duration();

        Ok(found)
    }
}
