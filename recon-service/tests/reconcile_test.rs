//! Integration tests for reconciliation runs and match confirmation.

mod common;

use common::{create_invoice, create_tenant, import_transactions, spawn_app, TestApp};
use serde_json::{json, Value};

async fn reconcile(app: &TestApp, tenant_id: i64) -> Vec<Value> {
    let response = app
        .client
        .post(format!("{}/tenants/{}/reconcile", app.address, tenant_id))
        .json(&json!({"max_candidates_per_invoice": 3, "date_window_days": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

async fn confirm(app: &TestApp, tenant_id: i64, match_id: i64) -> reqwest::Response {
    app.client
        .post(format!(
            "{}/tenants/{}/matches/{}/confirm",
            app.address, tenant_id, match_id
        ))
        .send()
        .await
        .unwrap()
}

/// Invoice plus the A/B/C transactions from the ranking scenario.
async fn seed_ranking_scenario(app: &TestApp, tenant_id: i64) -> i64 {
    let invoice_id = create_invoice(
        app,
        tenant_id,
        json!({
            "amount": "100.00",
            "currency": "USD",
            "invoice_date": "2026-01-10",
            "description": "acme widget"
        }),
    )
    .await;

    import_transactions(
        app,
        tenant_id,
        "seed",
        json!([
            {
                "external_id": "a",
                "posted_at": "2026-01-10T10:00:00Z",
                "amount": "100.00",
                "currency": "USD",
                "description": "acme widget payment"
            },
            {
                "external_id": "b",
                "posted_at": "2026-01-12T10:00:00Z",
                "amount": "100.00",
                "currency": "USD",
                "description": "unrelated"
            },
            {
                "external_id": "c",
                "posted_at": "2026-01-10T10:00:00Z",
                "amount": "99.00",
                "currency": "USD",
                "description": "acme widget"
            }
        ]),
    )
    .await;

    invoice_id
}

#[tokio::test]
async fn reconcile_ranks_candidates_by_score() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Rank").await;
    let invoice_id = seed_ranking_scenario(&app, tenant_id).await;

    let matches = reconcile(&app, tenant_id).await;
    let candidates: Vec<&Value> = matches
        .iter()
        .filter(|m| m["invoice_id"].as_i64() == Some(invoice_id))
        .collect();
    assert_eq!(candidates.len(), 3);

    // transactions imported in order a, b, c get ascending ids
    let scores: Vec<(i64, f64)> = candidates
        .iter()
        .map(|m| {
            (
                m["bank_transaction_id"].as_i64().unwrap(),
                m["score"].as_f64().unwrap(),
            )
        })
        .collect();
    let best = scores.iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).unwrap();
    let a_id = scores.iter().map(|s| s.0).min().unwrap();
    assert_eq!(best.0, a_id, "transaction A should score highest");
    assert!(best.1 >= 0.60, "A matches on amount plus date and text");

    for m in &candidates {
        assert_eq!(m["status"].as_str(), Some("proposed"));
        let score = m["score"].as_f64().unwrap();
        assert!(score > 0.0 && score <= 1.0);
    }
}

#[tokio::test]
async fn reconcile_recomputes_instead_of_accumulating() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Recompute").await;
    seed_ranking_scenario(&app, tenant_id).await;

    let first = reconcile(&app, tenant_id).await;
    let second = reconcile(&app, tenant_id).await;
    assert_eq!(first.len(), second.len());

    let pairs = |matches: &[Value]| -> Vec<(i64, i64, String)> {
        matches
            .iter()
            .map(|m| {
                (
                    m["invoice_id"].as_i64().unwrap(),
                    m["bank_transaction_id"].as_i64().unwrap(),
                    format!("{:.4}", m["score"].as_f64().unwrap()),
                )
            })
            .collect()
    };
    assert_eq!(pairs(&first), pairs(&second));

    // storage holds exactly the latest speculative set
    let response = app
        .client
        .get(format!("{}/tenants/{}/matches", app.address, tenant_id))
        .send()
        .await
        .unwrap();
    let stored: Vec<Value> = response.json().await.unwrap();
    assert_eq!(stored.len(), second.len());
}

#[tokio::test]
async fn equal_scores_break_ties_by_transaction_id() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Ties").await;
    create_invoice(
        &app,
        tenant_id,
        json!({"amount": "10.00", "currency": "USD", "description": "twin"}),
    )
    .await;

    // identical rows without a natural key score identically
    let row = json!({
        "posted_at": "2026-01-10T10:00:00Z",
        "amount": "10.00",
        "currency": "USD",
        "description": "twin"
    });
    import_transactions(&app, tenant_id, "k", json!([row.clone(), row.clone()])).await;

    let matches = reconcile(&app, tenant_id).await;
    assert_eq!(matches.len(), 2);
    let first_txn = matches[0]["bank_transaction_id"].as_i64().unwrap();
    let second_txn = matches[1]["bank_transaction_id"].as_i64().unwrap();
    assert!(first_txn < second_txn);
    assert_eq!(
        matches[0]["score"].as_f64().unwrap(),
        matches[1]["score"].as_f64().unwrap()
    );
}

#[tokio::test]
async fn max_candidates_bounds_the_proposal_set() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Bounded").await;
    create_invoice(&app, tenant_id, json!({"amount": "10.00", "currency": "USD"})).await;

    let rows: Vec<Value> = (0..5)
        .map(|i| {
            json!({
                "external_id": format!("t{}", i),
                "posted_at": "2026-01-10T10:00:00Z",
                "amount": "10.00",
                "currency": "USD"
            })
        })
        .collect();
    import_transactions(&app, tenant_id, "k", Value::Array(rows)).await;

    let response = app
        .client
        .post(format!("{}/tenants/{}/reconcile", app.address, tenant_id))
        .json(&json!({"max_candidates_per_invoice": 2, "date_window_days": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let matches: Vec<Value> = response.json().await.unwrap();
    assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn reconcile_params_are_range_checked() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "RangeCheck").await;

    let response = app
        .client
        .post(format!("{}/tenants/{}/reconcile", app.address, tenant_id))
        .json(&json!({"max_candidates_per_invoice": 0, "date_window_days": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    let response = app
        .client
        .post(format!("{}/tenants/{}/reconcile", app.address, tenant_id))
        .json(&json!({"max_candidates_per_invoice": 3, "date_window_days": 31}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn confirming_a_match_updates_invoice_and_prunes_rivals() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Confirm").await;
    let invoice_id = seed_ranking_scenario(&app, tenant_id).await;

    let matches = reconcile(&app, tenant_id).await;
    let best = matches
        .iter()
        .filter(|m| m["invoice_id"].as_i64() == Some(invoice_id))
        .max_by(|a, b| {
            a["score"]
                .as_f64()
                .unwrap()
                .partial_cmp(&b["score"].as_f64().unwrap())
                .unwrap()
        })
        .unwrap();
    let match_id = best["id"].as_i64().unwrap();

    let response = confirm(&app, tenant_id, match_id).await;
    assert_eq!(response.status(), 200);
    let confirmed: Value = response.json().await.unwrap();
    assert_eq!(confirmed["status"].as_str(), Some("confirmed"));

    // invoice flipped to matched
    let response = app
        .client
        .get(format!("{}/tenants/{}/invoices", app.address, tenant_id))
        .query(&[("status", "matched")])
        .send()
        .await
        .unwrap();
    let items: Vec<Value> = response.json().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_i64(), Some(invoice_id));

    // all other proposals touched the same invoice, so only the confirmed
    // match remains
    let response = app
        .client
        .get(format!("{}/tenants/{}/matches", app.address, tenant_id))
        .send()
        .await
        .unwrap();
    let stored: Vec<Value> = response.json().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["id"].as_i64(), Some(match_id));
}

#[tokio::test]
async fn confirming_twice_is_an_invalid_state() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Twice").await;
    seed_ranking_scenario(&app, tenant_id).await;

    let matches = reconcile(&app, tenant_id).await;
    let match_id = matches[0]["id"].as_i64().unwrap();

    assert_eq!(confirm(&app, tenant_id, match_id).await.status(), 200);
    assert_eq!(confirm(&app, tenant_id, match_id).await.status(), 409);
}

#[tokio::test]
async fn confirming_an_unknown_match_is_not_found() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Unknown").await;
    assert_eq!(confirm(&app, tenant_id, 12345).await.status(), 404);
}

#[tokio::test]
async fn confirmed_transaction_cannot_be_claimed_again() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Claimed").await;

    // two open invoices compete for the same transaction
    let invoice_x = create_invoice(
        &app,
        tenant_id,
        json!({"amount": "100.00", "currency": "USD", "description": "alpha"}),
    )
    .await;
    create_invoice(
        &app,
        tenant_id,
        json!({"amount": "100.00", "currency": "USD", "description": "alpha"}),
    )
    .await;
    import_transactions(
        &app,
        tenant_id,
        "k",
        json!([{
            "external_id": "t1",
            "posted_at": "2026-01-10T10:00:00Z",
            "amount": "100.00",
            "currency": "USD",
            "description": "alpha"
        }]),
    )
    .await;

    let matches = reconcile(&app, tenant_id).await;
    let for_x: Vec<&Value> = matches
        .iter()
        .filter(|m| m["invoice_id"].as_i64() == Some(invoice_x))
        .collect();
    let match_x = for_x[0]["id"].as_i64().unwrap();
    assert_eq!(confirm(&app, tenant_id, match_x).await.status(), 200);

    // the rival's proposal was pruned, but a fresh run re-proposes the
    // transaction for the still-open invoice; claiming it must conflict
    let matches = reconcile(&app, tenant_id).await;
    assert_eq!(matches.len(), 1);
    let rival = matches[0]["id"].as_i64().unwrap();
    assert_eq!(confirm(&app, tenant_id, rival).await.status(), 409);
}

#[tokio::test]
async fn confirmed_matches_survive_reconcile_runs() {
    let app = spawn_app().await;
    let tenant_id = create_tenant(&app, "Survive").await;
    let invoice_id = seed_ranking_scenario(&app, tenant_id).await;

    let matches = reconcile(&app, tenant_id).await;
    let match_id = matches
        .iter()
        .filter(|m| m["invoice_id"].as_i64() == Some(invoice_id))
        .max_by(|a, b| {
            a["score"]
                .as_f64()
                .unwrap()
                .partial_cmp(&b["score"].as_f64().unwrap())
                .unwrap()
        })
        .unwrap()["id"]
        .as_i64()
        .unwrap();
    assert_eq!(confirm(&app, tenant_id, match_id).await.status(), 200);

    // the invoice is matched now, so the new run proposes nothing for it and
    // the confirmed match stays
    let created = reconcile(&app, tenant_id).await;
    assert!(created
        .iter()
        .all(|m| m["invoice_id"].as_i64() != Some(invoice_id)));

    let response = app
        .client
        .get(format!("{}/tenants/{}/matches", app.address, tenant_id))
        .query(&[("status", "confirmed")])
        .send()
        .await
        .unwrap();
    let confirmed: Vec<Value> = response.json().await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0]["id"].as_i64(), Some(match_id));
}

#[tokio::test]
async fn matches_are_tenant_scoped() {
    let app = spawn_app().await;
    let tenant_a = create_tenant(&app, "ScopeA").await;
    let tenant_b = create_tenant(&app, "ScopeB").await;
    seed_ranking_scenario(&app, tenant_a).await;

    let matches = reconcile(&app, tenant_a).await;
    let match_id = matches[0]["id"].as_i64().unwrap();

    // another tenant cannot confirm it
    assert_eq!(confirm(&app, tenant_b, match_id).await.status(), 404);
}
