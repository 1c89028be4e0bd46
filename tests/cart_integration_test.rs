//! HTTP-level tests for the cart endpoints.
//!
//! Everything here goes through the real router with a signed bearer token,
//! so these also cover the auth extractor, request parsing, and the response
//! envelope.

mod common;

use axum::{body, http::Method, response::Response};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Money fields serialize as decimal strings; compare them numerically so
/// the assertions do not depend on the backend's scale handling.
fn decimal_value(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal fields serialize as strings")
        .parse()
        .expect("decimal parse")
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_returns_cart_and_summary() {
    let app = TestApp::new().await;
    let radio = app.seed_product("Vintage radio", dec!(100.00), 5).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": radio.id, "quantity": 2 })),
        )
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Item added to cart successfully");

    let cart = &body["data"]["cart"];
    assert_eq!(cart["user_id"], app.user_id().to_string());
    assert_eq!(cart["total_items"], 2);
    assert_eq!(decimal_value(&cart["total_price"]), dec!(200.00));
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(cart["items"][0]["product_id"], radio.id.to_string());
    assert_eq!(cart["items"][0]["title"], "Vintage radio");
    assert_eq!(decimal_value(&cart["items"][0]["unit_price"]), dec!(100.00));
    assert_eq!(decimal_value(&cart["items"][0]["line_total"]), dec!(200.00));

    let summary = &body["data"]["summary"];
    assert_eq!(summary["total_items"], 2);
    assert_eq!(summary["item_count"], 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_defaults_quantity_to_one() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 8).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": lamp.id })),
        )
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["cart"]["items"][0]["quantity"], 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_without_product_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "quantity": 2 })),
        )
        .await;

    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert_eq!(body["message"], "Product ID is required");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_for_unknown_product_is_404() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({
                "product_id": "00000000-0000-0000-0000-000000000001",
                "quantity": 1
            })),
        )
        .await;

    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn cart_routes_require_a_bearer_token() {
    let app = TestApp::new().await;

    for (method, uri) in [
        (Method::GET, "/api/v1/cart"),
        (Method::GET, "/api/v1/cart/summary"),
        (Method::POST, "/api/v1/cart/items"),
        (Method::DELETE, "/api/v1/cart"),
    ] {
        let response = app.request(method, uri, None, None).await;
        assert_eq!(response.status(), 401, "{} should require auth", uri);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Authentication required");
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn garbage_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some("not-a-jwt"))
        .await;

    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn get_cart_creates_an_empty_cart() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["cart"]["total_items"], 0);
    assert_eq!(decimal_value(&body["data"]["cart"]["total_price"]), Decimal::ZERO);
    assert_eq!(
        body["data"]["cart"]["items"].as_array().map(Vec::len),
        Some(0)
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn summary_without_a_cart_reports_zeroes() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart/summary", None)
        .await;

    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total_items"], 0);
    assert_eq!(decimal_value(&body["data"]["total_price"]), Decimal::ZERO);
    assert_eq!(body["data"]["item_count"], 0);
    assert_eq!(body["data"]["last_updated"], Value::Null);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn update_and_remove_round_trip() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;
    let bike = app.seed_product("Mountain bike", dec!(4500.00), 3).await;

    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": lamp.id, "quantity": 2 })),
    )
    .await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": bike.id, "quantity": 1 })),
    )
    .await;

    // Raise the lamp line to 4
    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", lamp.id),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Cart item updated successfully");
    assert_eq!(body["data"]["cart"]["total_items"], 5);
    assert_eq!(
        decimal_value(&body["data"]["cart"]["total_price"]),
        dec!(5900.00)
    );

    // Zero quantity removes the line
    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", lamp.id),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Item removed from cart");
    assert_eq!(
        body["data"]["cart"]["items"].as_array().map(Vec::len),
        Some(1)
    );

    // DELETE drops the remaining line
    let response = app
        .request_authenticated(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", bike.id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Item removed from cart successfully");
    assert_eq!(body["data"]["cart"]["total_items"], 0);
    assert_eq!(
        decimal_value(&body["data"]["cart"]["total_price"]),
        Decimal::ZERO
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn negative_quantity_is_a_bad_request() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;

    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": lamp.id, "quantity": 1 })),
    )
    .await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", lamp.id),
            Some(json!({ "quantity": -2 })),
        )
        .await;

    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Quantity cannot be negative");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn mutations_without_a_cart_are_404() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", lamp.id),
            Some(json!({ "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Cart not found");

    let response = app
        .request_authenticated(Method::DELETE, "/api/v1/cart", None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn clear_cart_keeps_the_record() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": lamp.id, "quantity": 3 })),
        )
        .await;
    let body = response_json(response).await;
    let cart_id = body["data"]["cart"]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(Method::DELETE, "/api/v1/cart", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Cart cleared successfully");
    assert_eq!(body["data"]["cart"]["id"], cart_id.as_str());
    assert_eq!(body["data"]["cart"]["total_items"], 0);
    assert_eq!(body["data"]["summary"]["item_count"], 0);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn carts_are_isolated_between_tokens() {
    let app = TestApp::new().await;
    let other_user = uuid::Uuid::new_v4();
    let other_token = app.token_for(other_user);

    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;
    let bike = app.seed_product("Mountain bike", dec!(4500.00), 3).await;

    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": lamp.id, "quantity": 1 })),
    )
    .await;
    app.request(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": bike.id, "quantity": 1 })),
        Some(&other_token),
    )
    .await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&other_token))
        .await;
    let body = response_json(response).await;

    let items = body["data"]["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], bike.id.to_string());
    assert_eq!(
        decimal_value(&body["data"]["cart"]["total_price"]),
        dec!(4500.00)
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn sold_out_lines_disappear_from_the_cart_read() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk lamp", dec!(350.00), 10).await;
    let bike = app.seed_product("Mountain bike", dec!(4500.00), 3).await;

    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": lamp.id, "quantity": 2 })),
    )
    .await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart/items",
        Some(json!({ "product_id": bike.id, "quantity": 1 })),
    )
    .await;

    app.set_product_stock(lamp.id, 0).await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = response_json(response).await;

    let items = body["data"]["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], bike.id.to_string());
    assert_eq!(
        decimal_value(&body["data"]["cart"]["total_price"]),
        dec!(4500.00)
    );
    assert_eq!(body["data"]["summary"]["total_items"], 1);
}
