//! Tests for payment verification and the payment history listing.
//!
//! Verification is exercised end to end: a checkout mints an intent
//! through the fake gateway, and the confirmation signature is computed
//! with the same secret the gateway holds.

mod common;

use assert_matches::assert_matches;
use axum::{body, http::Method, response::Response};
use chrono::{Duration, Utc};
use common::TestApp;
use rstest::rstest;
use rust_decimal_macros::dec;
use sellx_api::entities::order::{OrderStatus, PaymentStatus};
use sellx_api::errors::ServiceError;
use sellx_api::services::payment_service::VerifyPaymentInput;
use serde_json::{json, Value};
use uuid::Uuid;

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Runs an ad-hoc checkout and returns `(order_id, intent_id)`.
///
/// Receipts are millisecond-stamped and order numbers unique, so a short
/// pause keeps consecutive checkouts from colliding.
async fn checkout(app: &TestApp, product_id: Uuid, quantity: i32, total: &str) -> (Uuid, String) {
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": quantity }],
                "total_amount": total
            })),
        )
        .await;
    assert_eq!(response.status(), 201, "checkout setup failed");
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().parse().unwrap();
    let intent_id = body["data"]["order"]["id"].as_str().unwrap().to_string();
    (order_id, intent_id)
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn valid_signature_confirms_the_order() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    let (order_id, intent_id) = checkout(&app, radio.id, 2, "200.00").await;

    let signature = app.gateway.sign(&intent_id, "pay_0001");
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": intent_id,
                "payment_id": "pay_0001",
                "signature": signature
            })),
        )
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Payment verified successfully");
    assert_eq!(body["data"]["order_id"], order_id.to_string());
    assert_eq!(body["data"]["payment_id"], "pay_0001");
    assert_eq!(body["data"]["status"], "success");
    assert!(body["data"]["paid_at"].as_str().is_some());

    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
    assert_eq!(stored.payment_id.as_deref(), Some("pay_0001"));
    assert_eq!(stored.payment_signature.as_deref(), Some(signature.as_str()));
    assert!(stored.paid_at.is_some());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn tampered_signature_is_rejected_and_changes_nothing() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    let (order_id, intent_id) = checkout(&app, radio.id, 2, "200.00").await;

    // Flip the last hex digit of an otherwise valid signature
    let valid = app.gateway.sign(&intent_id, "pay_0001");
    let mut tampered = valid[..valid.len() - 1].to_string();
    tampered.push(if valid.ends_with('0') { '1' } else { '0' });

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": intent_id,
                "payment_id": "pay_0001",
                "signature": tampered
            })),
        )
        .await;

    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Invalid payment signature");

    let stored = app.find_order(order_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert!(stored.payment_id.is_none());
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn signature_over_different_fields_is_rejected() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    let (_order_id, intent_id) = checkout(&app, radio.id, 2, "200.00").await;

    // Signature computed for another payment id does not transfer
    let signature = app.gateway.sign(&intent_id, "pay_other");
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": intent_id,
                "payment_id": "pay_0001",
                "signature": signature
            })),
        )
        .await;

    assert_eq!(response.status(), 401);
}

#[rstest]
#[case::empty_payload(json!({}))]
#[case::intent_only(json!({ "intent_id": "order_x" }))]
#[case::no_signature(json!({ "intent_id": "order_x", "payment_id": "pay_x" }))]
#[case::blank_intent(json!({ "intent_id": "", "payment_id": "pay_x", "signature": "abc" }))]
#[case::whitespace_payment(json!({ "intent_id": "order_x", "payment_id": "  ", "signature": "abc" }))]
#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn missing_verification_details_are_a_bad_request(#[case] payload: Value) {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::POST, "/api/v1/checkout/verify", Some(payload.clone()))
        .await;

    assert_eq!(response.status(), 400, "payload: {}", payload);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Payment verification details are required");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn missing_details_at_the_service_level() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .payment
        .verify_payment(VerifyPaymentInput {
            intent_id: "order_x".to_string(),
            payment_id: String::new(),
            signature: "abc".to_string(),
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidInput(msg) => {
        assert_eq!(msg, "Payment verification details are required");
    });
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn valid_signature_for_unknown_intent_is_404() {
    let app = TestApp::new().await;

    let signature = app.gateway.sign("order_ghost", "pay_0001");
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": "order_ghost",
                "payment_id": "pay_0001",
                "signature": signature
            })),
        )
        .await;

    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn replayed_confirmation_is_a_no_op() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    let (order_id, intent_id) = checkout(&app, radio.id, 2, "200.00").await;

    let signature = app.gateway.sign(&intent_id, "pay_0001");
    let first = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": intent_id,
                "payment_id": "pay_0001",
                "signature": signature
            })),
        )
        .await;
    assert_eq!(first.status(), 200);
    let settled = app.find_order(order_id).await.unwrap();

    // The gateway retries with a different payment id; the stored order
    // must not change
    let replay_signature = app.gateway.sign(&intent_id, "pay_retry");
    let second = app
        .request_authenticated(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": intent_id,
                "payment_id": "pay_retry",
                "signature": replay_signature
            })),
        )
        .await;

    assert_eq!(second.status(), 200);
    let body = response_json(second).await;
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["payment_id"], "pay_0001");

    let after = app.find_order(order_id).await.unwrap();
    assert_eq!(after.payment_id, settled.payment_id);
    assert_eq!(after.payment_signature, settled.payment_signature);
    assert_eq!(after.paid_at, settled.paid_at);
    assert_eq!(after.updated_at, settled.updated_at);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn verify_requires_authentication() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "intent_id": "order_x",
                "payment_id": "pay_x",
                "signature": "abc"
            })),
            None,
        )
        .await;

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn history_pages_newest_first() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 99).await;

    // Three orders with distinct ages; distinct totals dodge the dedup guard
    let (oldest, _) = checkout(&app, radio.id, 1, "100.00").await;
    let (middle, _) = checkout(&app, radio.id, 2, "200.00").await;
    let (newest, _) = checkout(&app, radio.id, 3, "300.00").await;
    app.backdate_order(oldest, Utc::now() - Duration::minutes(30))
        .await;
    app.backdate_order(middle, Utc::now() - Duration::minutes(20))
        .await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/checkout/history?page=1&limit=2", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 2);
    assert_eq!(body["data"]["total_pages"], 2);

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], newest.to_string());
    assert_eq!(items[1]["id"], middle.to_string());
    assert_eq!(items[0]["order_type"], "from-cart");
    assert_eq!(items[0]["payment_status"], "pending");

    let response = app
        .request_authenticated(Method::GET, "/api/v1/checkout/history?page=2&limit=2", None)
        .await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], oldest.to_string());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn history_defaults_and_clamps_pagination() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    checkout(&app, radio.id, 1, "100.00").await;

    // No query string at all
    let response = app
        .request_authenticated(Method::GET, "/api/v1/checkout/history", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 10);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));

    // Zero values are clamped to one
    let response = app
        .request_authenticated(Method::GET, "/api/v1/checkout/history?page=0&limit=0", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["limit"], 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn history_only_shows_the_callers_orders() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    checkout(&app, radio.id, 1, "100.00").await;

    let other_token = app.token_for(Uuid::new_v4());
    let response = app
        .request(
            Method::GET,
            "/api/v1/checkout/history",
            None,
            Some(&other_token),
        )
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn confirmed_orders_show_their_payment_fields_in_history() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;
    let (_order_id, intent_id) = checkout(&app, radio.id, 2, "200.00").await;

    let signature = app.gateway.sign(&intent_id, "pay_hist");
    app.request_authenticated(
        Method::POST,
        "/api/v1/checkout/verify",
        Some(json!({
            "intent_id": intent_id,
            "payment_id": "pay_hist",
            "signature": signature
        })),
    )
    .await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/checkout/history", None)
        .await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], "confirmed");
    assert_eq!(items[0]["payment_status"], "completed");
    assert_eq!(items[0]["payment_id"], "pay_hist");
    assert!(items[0]["paid_at"].as_str().is_some());
}
