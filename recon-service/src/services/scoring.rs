//! Deterministic invoice/transaction match scoring.
//!
//! Weighting (simple + explainable):
//! - Amount: up to 0.60
//! - Date proximity: up to 0.20
//! - Text similarity: up to 0.20

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashSet;

pub const DEFAULT_DATE_WINDOW_DAYS: u32 = 3;
pub const DEFAULT_AMOUNT_TOLERANCE_RATIO: f64 = 0.01;

/// Component-wise breakdown of a match score. Total is always in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub amount_score: f64,
    pub date_score: f64,
    pub text_score: f64,
    pub total: f64,
}

/// Token-set Jaccard similarity over lower-cased, whitespace-split tokens.
/// Empty or absent text on either side yields 0.
pub fn token_jaccard(a: Option<&str>, b: Option<&str>) -> f64 {
    let tokens = |s: Option<&str>| -> HashSet<String> {
        s.unwrap_or("")
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect()
    };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

/// Absolute day distance between the invoice date and the transaction's
/// posted date, or None when the invoice carries no date.
pub fn date_distance_days(invoice_date: Option<NaiveDate>, posted_at: DateTime<Utc>) -> Option<i64> {
    invoice_date.map(|d| (posted_at.date_naive() - d).num_days().abs())
}

/// Score one invoice against one transaction. Pure and deterministic: the
/// same inputs always produce the same breakdown, and no input is a failure.
pub fn compute_score(
    invoice_amount: Decimal,
    invoice_date: Option<NaiveDate>,
    invoice_desc: Option<&str>,
    txn_amount: Decimal,
    txn_posted_at: DateTime<Utc>,
    txn_desc: Option<&str>,
    date_window_days: u32,
    amount_tolerance_ratio: f64,
) -> ScoreBreakdown {
    let invoice_amount = invoice_amount.to_f64().unwrap_or(0.0);
    let txn_amount = txn_amount.to_f64().unwrap_or(0.0);

    // Amount
    let diff = (invoice_amount - txn_amount).abs();
    let amount_score = if diff < 0.005 {
        0.60
    } else {
        let tolerance = (invoice_amount * amount_tolerance_ratio).max(0.01);
        if diff <= tolerance { 0.40 } else { 0.0 }
    };

    // Date: closer = higher
    let date_score = match date_distance_days(invoice_date, txn_posted_at) {
        Some(dd) if dd <= date_window_days as i64 => {
            0.20 * (1.0 - dd as f64 / date_window_days.max(1) as f64)
        }
        _ => 0.0,
    };

    // Text
    let text_score = 0.20 * token_jaccard(invoice_desc, txn_desc).min(1.0);

    let total = (amount_score + date_score + text_score).min(1.0);
    ScoreBreakdown {
        amount_score,
        date_score,
        text_score,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn posted(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn exact_amount_same_day_full_text_overlap() {
        let sb = compute_score(
            dec("100.00"),
            Some(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()),
            Some("acme widget"),
            dec("100.00"),
            posted(2026, 1, 10),
            Some("acme widget"),
            DEFAULT_DATE_WINDOW_DAYS,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        assert_eq!(sb.amount_score, 0.60);
        assert_eq!(sb.date_score, 0.20);
        assert_eq!(sb.text_score, 0.20);
        assert_eq!(sb.total, 1.0);
    }

    #[test]
    fn close_amount_scores_partial_credit() {
        let sb = compute_score(
            dec("100.00"),
            None,
            None,
            dec("100.50"),
            posted(2026, 1, 10),
            None,
            DEFAULT_DATE_WINDOW_DAYS,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        assert_eq!(sb.amount_score, 0.40);
        assert_eq!(sb.date_score, 0.0);
        assert_eq!(sb.text_score, 0.0);
    }

    #[test]
    fn amount_outside_tolerance_scores_zero() {
        let sb = compute_score(
            dec("100.00"),
            None,
            None,
            dec("99.00"),
            posted(2026, 1, 10),
            None,
            DEFAULT_DATE_WINDOW_DAYS,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        assert_eq!(sb.amount_score, 0.0);
        assert_eq!(sb.total, 0.0);
    }

    #[test]
    fn date_score_decays_with_distance() {
        let inv_date = Some(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        let near = compute_score(
            dec("1.00"),
            inv_date,
            None,
            dec("1.00"),
            posted(2026, 1, 11),
            None,
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        let far = compute_score(
            dec("1.00"),
            inv_date,
            None,
            dec("1.00"),
            posted(2026, 1, 12),
            None,
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        let outside = compute_score(
            dec("1.00"),
            inv_date,
            None,
            dec("1.00"),
            posted(2026, 1, 14),
            None,
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        assert!(near.date_score > far.date_score);
        assert!(far.date_score > 0.0);
        assert_eq!(outside.date_score, 0.0);
    }

    #[test]
    fn missing_invoice_date_nulls_the_component() {
        let sb = compute_score(
            dec("50.00"),
            None,
            Some("x"),
            dec("50.00"),
            posted(2026, 1, 10),
            Some("x"),
            DEFAULT_DATE_WINDOW_DAYS,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        assert_eq!(sb.date_score, 0.0);
    }

    #[test]
    fn jaccard_is_case_insensitive_and_set_based() {
        assert_eq!(token_jaccard(Some("Acme Widget"), Some("acme widget")), 1.0);
        assert_eq!(token_jaccard(Some("a b"), Some("b c")), 1.0 / 3.0);
        assert_eq!(token_jaccard(Some("a a a"), Some("a")), 1.0);
        assert_eq!(token_jaccard(Some(""), Some("a")), 0.0);
        assert_eq!(token_jaccard(None, Some("a")), 0.0);
    }

    #[test]
    fn spec_scenario_orders_candidates() {
        // invoice 100.00 @ 2026-01-10 "acme widget" vs transactions A, B, C
        let amount = dec("100.00");
        let inv_date = Some(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        let desc = Some("acme widget");

        let a = compute_score(
            amount,
            inv_date,
            desc,
            dec("100.00"),
            posted(2026, 1, 10),
            Some("acme widget payment"),
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        let b = compute_score(
            amount,
            inv_date,
            desc,
            dec("100.00"),
            posted(2026, 1, 12),
            Some("unrelated"),
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );
        let c = compute_score(
            amount,
            inv_date,
            desc,
            dec("99.00"),
            posted(2026, 1, 10),
            Some("acme widget"),
            3,
            DEFAULT_AMOUNT_TOLERANCE_RATIO,
        );

        assert!(a.total > c.total);
        assert!(c.total > b.total);
        assert!(a.total >= 0.60 + a.date_score + a.text_score - f64::EPSILON);
        assert!(a.date_score > 0.0);
        assert!(a.text_score > 0.0);
    }

    #[test]
    fn total_is_bounded_and_deterministic() {
        let run = || {
            compute_score(
                dec("10.00"),
                Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
                Some("alpha beta"),
                dec("10.00"),
                posted(2026, 3, 1),
                Some("alpha beta"),
                5,
                DEFAULT_AMOUNT_TOLERANCE_RATIO,
            )
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.total <= 1.0);
        assert!(first.total >= 0.0);
    }
}
