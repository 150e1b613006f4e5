//! Match explanations: AI-backed when available, templated fallback always.

use recon_core::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::models::{BankTransaction, Invoice};
use crate::services::ai::ExplainProvider;
use crate::services::database::Database;
use crate::services::metrics::record_ai_explanation;
use crate::services::scoring::{
    compute_score, date_distance_days, ScoreBreakdown, DEFAULT_AMOUNT_TOLERANCE_RATIO,
    DEFAULT_DATE_WINDOW_DAYS,
};

/// Explanation of a proposed invoice/transaction pairing.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub explanation: String,
    pub confidence: String,
    pub used_ai: bool,
}

fn confidence_bucket(score: f64) -> &'static str {
    if score >= 0.75 {
        "high"
    } else if score >= 0.45 {
        "medium"
    } else {
        "low"
    }
}

fn build_prompt(invoice: &Invoice, txn: &BankTransaction, breakdown: &ScoreBreakdown) -> String {
    format!(
        "Explain why this invoice and bank transaction are likely a match. \
         Use only the provided facts.\n\n\
         Invoice: amount={} {}, date={}, description={}\n\
         Transaction: amount={} {}, posted_at={}, description={}\n\
         Heuristic score={:.2} (amount={:.2}, date={:.2}, text={:.2})\n\
         Return 2-6 sentences and include a confidence label.",
        invoice.amount,
        invoice.currency,
        invoice
            .invoice_date
            .map_or_else(|| "None".to_string(), |d| d.to_string()),
        invoice.description.as_deref().unwrap_or("None"),
        txn.amount,
        txn.currency,
        txn.posted_at.date_naive(),
        txn.description.as_deref().unwrap_or("None"),
        breakdown.total,
        breakdown.amount_score,
        breakdown.date_score,
        breakdown.text_score,
    )
}

/// Deterministic templated explanation. Pure and infallible: this is the
/// availability guarantee when the AI backend is down or disabled.
fn fallback_explanation(invoice: &Invoice, txn: &BankTransaction, score: f64) -> Explanation {
    let confidence = confidence_bucket(score);

    let mut parts: Vec<String> = Vec::new();
    if invoice.amount == txn.amount {
        parts.push("The amounts match exactly".to_string());
    } else {
        parts.push("The amounts are close".to_string());
    }
    if let Some(days) = date_distance_days(invoice.invoice_date, txn.posted_at) {
        parts.push(format!("the dates are {} days apart", days));
    }
    if invoice.description.is_some() && txn.description.is_some() {
        parts.push("the descriptions share similar terms".to_string());
    }

    Explanation {
        explanation: format!(
            "{}. Overall score {:.2} suggests {} confidence.",
            parts.join(", "),
            score,
            confidence
        ),
        confidence: confidence.to_string(),
        used_ai: false,
    }
}

/// Builds explanations for invoice/transaction pairs.
pub struct ExplanationService {
    db: Arc<Database>,
    provider: Arc<dyn ExplainProvider>,
    ai_timeout: Duration,
}

impl ExplanationService {
    pub fn new(db: Arc<Database>, provider: Arc<dyn ExplainProvider>, ai_timeout: Duration) -> Self {
        Self {
            db,
            provider,
            ai_timeout,
        }
    }

    /// Explain why an invoice and a transaction are likely a match.
    ///
    /// Tries the configured AI provider within a bounded timeout; any failure
    /// is absorbed into the templated fallback rather than surfaced.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id, transaction_id = %txn_id))]
    pub async fn explain(
        &self,
        tenant_id: i64,
        invoice_id: i64,
        txn_id: i64,
    ) -> Result<Explanation, AppError> {
        let invoice = self.db.get_invoice(tenant_id, invoice_id).await?;
        let txn = self.db.get_bank_transaction(tenant_id, txn_id).await?;
        let (Some(invoice), Some(txn)) = (invoice, txn) else {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice or transaction not found"
            )));
        };

        let breakdown = compute_score(
            invoice.amount,
            invoice.invoice_date,
            invoice.description.as_deref(),
            txn.amount,
            txn.posted_at,
            txn.description.as_deref(),
            DEFAULT_DATE_WINDOW_DAYS,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );

        let prompt = build_prompt(&invoice, &txn, &breakdown);

        match tokio::time::timeout(self.ai_timeout, self.provider.explain_match(&prompt)).await {
            Ok(Ok(result)) => {
                record_ai_explanation("ai");
                Ok(Explanation {
                    explanation: result.explanation,
                    confidence: result.confidence,
                    used_ai: true,
                })
            }
            Ok(Err(e)) => {
                debug!(error = %e, "AI provider failed, using fallback explanation");
                record_ai_explanation("fallback");
                Ok(fallback_explanation(&invoice, &txn, breakdown.total))
            }
            Err(_) => {
                debug!("AI provider timed out, using fallback explanation");
                record_ai_explanation("fallback");
                Ok(fallback_explanation(&invoice, &txn, breakdown.total))
            }
        }
    }
}
