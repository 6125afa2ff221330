//! API Integration Tests
//!
//! Drives the full router over the in-memory ledger.

use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

mod common;

use common::{memory_app, send};

async fn create_wallet(app: &axum::Router, currency: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/wallets",
        Some(json!({ "owner_user_id": Uuid::new_v4(), "currency": currency })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "wallet creation failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

fn movement(amount: &str, key: &str) -> Option<Value> {
    Some(json!({ "amount": amount, "currency": "USD", "idempotency_key": key }))
}

#[tokio::test]
async fn test_health() {
    let (app, _) = memory_app();
    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_credit_debit_e2e() {
    let (app, ledger) = memory_app();
    let wallet = create_wallet(&app, "USD").await;

    // 1. Credit 100.00 with key k1
    let (status, credit) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("100.00", "k1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credit["status"], "COMPLETED");
    assert_eq!(credit["transaction_type"], "DEPOSIT");

    // 2. Same key again: same transaction, no second credit
    let (status, replay) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("100.00", "k1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["id"], credit["id"]);

    // 3. Debit 150 with k2 fails and is recorded
    let (status, failed) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/debit"),
        movement("150", "k2"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(failed["error_code"], "insufficient_balance");
    let failed_id = failed["transaction_id"].as_str().unwrap().to_string();

    let (status, stored) = send(&app, "GET", "/api/v1/transactions/by-key/k2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["id"], failed_id.as_str());
    assert_eq!(stored["status"], "FAILED");

    // 4. Balance untouched by the failure
    let (status, wallet_body) = send(&app, "GET", &format!("/api/v1/wallets/{wallet}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet_body["available_balance"], "100.00");
    assert_eq!(wallet_body["reserved_balance"], "0");

    let event_types: Vec<String> = ledger
        .outbox_events()
        .await
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        event_types,
        vec!["wallet.created", "wallet.credited", "transaction.failed"]
    );
}

#[tokio::test]
async fn test_validation_and_not_found() {
    let (app, _) = memory_app();
    let wallet = create_wallet(&app, "USD").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("-5", "neg"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("1.123456789", "too-precise"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/wallets/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "wallet_not_found");
}

#[tokio::test]
async fn test_duplicate_wallet_conflict() {
    let (app, _) = memory_app();
    let owner = Uuid::new_v4();
    let body = Some(json!({ "owner_user_id": owner, "currency": "USD" }));

    let (status, _) = send(&app, "POST", "/api/v1/wallets", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = send(&app, "POST", "/api/v1/wallets", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error_code"], "wallet_already_exists");
}

#[tokio::test]
async fn test_transfer_and_currency_mismatch() {
    let (app, _) = memory_app();
    let source = create_wallet(&app, "USD").await;
    let destination = create_wallet(&app, "USD").await;
    let euro = create_wallet(&app, "EUR").await;

    send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{source}/credit"),
        movement("50", "fund"),
    )
    .await;

    let (status, transfer) = send(
        &app,
        "POST",
        "/api/v1/transfers",
        Some(json!({
            "source_wallet_id": source,
            "destination_wallet_id": destination,
            "amount": "20",
            "currency": "USD",
            "idempotency_key": "tr-1",
            "description": "split bill"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transfer["status"], "COMPLETED");

    let (status, err) = send(
        &app,
        "POST",
        "/api/v1/transfers",
        Some(json!({
            "source_wallet_id": source,
            "destination_wallet_id": euro,
            "amount": "5",
            "currency": "USD",
            "idempotency_key": "tr-2"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error_code"], "currency_mismatch");

    let (_, source_body) = send(&app, "GET", &format!("/api/v1/wallets/{source}"), None).await;
    assert_eq!(source_body["available_balance"], "30");
}

#[tokio::test]
async fn test_pending_transaction_lifecycle() {
    let (app, _) = memory_app();
    let wallet = create_wallet(&app, "USD").await;

    let (status, pending) = send(
        &app,
        "POST",
        "/api/v1/transactions",
        Some(json!({
            "transaction_type": "DEPOSIT",
            "source_wallet_id": null,
            "destination_wallet_id": wallet,
            "amount": "12.5",
            "currency": "USD",
            "idempotency_key": "pend-1",
            "external_reference": "psp-123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pending["status"], "PENDING");
    let id = pending["id"].as_str().unwrap();

    let (status, done) = send(
        &app,
        "POST",
        &format!("/api/v1/transactions/{id}/process"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "COMPLETED");

    let (status, err) = send(
        &app,
        "POST",
        &format!("/api/v1/transactions/{id}/cancel"),
        Some(json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error_code"], "invalid_transaction_state");
}

#[tokio::test]
async fn test_payout_settlement() {
    let (app, _) = memory_app();
    let wallet = create_wallet(&app, "USD").await;
    send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("80", "fund-po"),
    )
    .await;

    let (status, held) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/payout"),
        movement("30", "po-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(held["status"], "PROCESSING");
    let id = held["id"].as_str().unwrap();

    let (_, wallet_body) = send(&app, "GET", &format!("/api/v1/wallets/{wallet}"), None).await;
    assert_eq!(wallet_body["available_balance"], "50");
    assert_eq!(wallet_body["reserved_balance"], "30");

    let (status, settled) = send(
        &app,
        "POST",
        &format!("/api/v1/payouts/{id}/settle"),
        Some(json!({ "outcome": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["status"], "COMPLETED");

    let (_, wallet_body) = send(&app, "GET", &format!("/api/v1/wallets/{wallet}"), None).await;
    assert_eq!(wallet_body["reserved_balance"], "0");
}

#[tokio::test]
async fn test_wallet_status_endpoints() {
    let (app, _) = memory_app();
    let wallet = create_wallet(&app, "USD").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/lock"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "LOCKED");

    let (status, err) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        movement("1", "locked-credit"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error_code"], "wallet_not_active");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/close"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED");
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    let (app, _) = memory_app();
    let correlation_id = Uuid::new_v4();

    let request = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/api/v1/wallets/{}", Uuid::new_v4()))
        .header("x-correlation-id", correlation_id.to_string())
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(app, request).await.unwrap();

    assert_eq!(
        response.headers()["x-correlation-id"],
        correlation_id.to_string().as_str()
    );
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let (app, _) = memory_app();
    let wallet = create_wallet(&app, "USD").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/wallets/{wallet}/credit"),
        Some(json!({ "amount": "5", "currency": "USD" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
    assert!(body["error"].as_str().unwrap().contains("idempotency_key"));

    let (status, body) = send(&app, "GET", "/api/v1/wallets/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}
