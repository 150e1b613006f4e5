//! Domain models for recon-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Convert a scale-2 decimal amount to integer minor units (cents).
///
/// Rejects non-positive amounts and amounts with more than two fraction
/// digits, so the stored representation is always exact.
pub fn amount_to_minor(amount: Decimal) -> Result<i64, String> {
    if amount <= Decimal::ZERO {
        return Err("amount must be positive".to_string());
    }
    let scaled = amount * Decimal::from(100);
    if scaled.fract() != Decimal::ZERO {
        return Err("amount must have at most 2 decimal places".to_string());
    }
    rust_decimal::prelude::ToPrimitive::to_i64(&scaled).ok_or_else(|| "amount out of range".to_string())
}

/// Convert stored minor units back to a scale-2 decimal.
pub fn minor_to_amount(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

// ============================================================================
// Tenant / Vendor Models
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vendor {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Invoice Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Open,
    Matched,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Matched => "matched",
            Self::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "matched" => Some(Self::Matched),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub tenant_id: i64,
    pub vendor_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub invoice_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Invoice {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            vendor_id: row.try_get("vendor_id")?,
            invoice_number: row.try_get("invoice_number")?,
            amount: minor_to_amount(row.try_get("amount_minor")?),
            currency: row.try_get("currency")?,
            invoice_date: row.try_get("invoice_date")?,
            description: row.try_get("description")?,
            status: row.try_get("status")?,
            created_utc: row.try_get("created_utc")?,
        })
    }
}

// ============================================================================
// Bank Transaction Models
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BankTransaction {
    pub id: i64,
    pub tenant_id: i64,
    pub external_id: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for BankTransaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            external_id: row.try_get("external_id")?,
            posted_at: row.try_get("posted_at")?,
            amount: minor_to_amount(row.try_get("amount_minor")?),
            currency: row.try_get("currency")?,
            description: row.try_get("description")?,
            created_utc: row.try_get("created_utc")?,
        })
    }
}

// ============================================================================
// Match Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Proposed,
    Confirmed,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(Self::Proposed),
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Match {
    pub id: i64,
    pub tenant_id: i64,
    pub invoice_id: i64,
    pub bank_transaction_id: i64,
    pub score: f64,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Idempotency Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub key: String,
    pub request_hash: String,
    pub response_json: String,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn amount_round_trips_through_minor_units() {
        let amount = Decimal::from_str("100.25").unwrap();
        let minor = amount_to_minor(amount).unwrap();
        assert_eq!(minor, 10025);
        assert_eq!(minor_to_amount(minor), amount);
    }

    #[test]
    fn amount_rejects_non_positive() {
        assert!(amount_to_minor(Decimal::ZERO).is_err());
        assert!(amount_to_minor(Decimal::from_str("-5.00").unwrap()).is_err());
    }

    #[test]
    fn amount_rejects_sub_cent_precision() {
        assert!(amount_to_minor(Decimal::from_str("10.005").unwrap()).is_err());
    }
}
