use crate::auth::AuthenticatedUser;
use crate::entities::order::Model as OrderModel;
use crate::errors::ServiceError;
use crate::gateway::PaymentIntent;
use crate::handlers::AppState;
use crate::services::checkout_service::{CartCheckoutInput, CheckoutInput, CheckoutOutcome};
use crate::services::payment_service::{VerifiedPayment, VerifyPaymentInput};
use crate::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout and payment verification endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_checkout))
        .route("/cart", post(checkout_from_cart))
        .route("/verify", post(verify_payment))
        .route("/history", get(payment_history))
}

/// Pagination for the payment history listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// One-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

/// What both checkout endpoints hand back: the gateway intent for the
/// client's payment UI plus the pending order behind it.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: PaymentIntent,
    pub order_id: Uuid,
    pub order_number: String,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            order: outcome.intent,
            order_id: outcome.order_id,
            order_number: outcome.order_number,
        }
    }
}

// Handler functions

/// Create a payment intent from an inline item list
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutInput,
    responses(
        (status = 201, description = "Pending order created", body = crate::ApiResponse<CheckoutResponse>),
        (status = 200, description = "Existing pending order reused", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No valid products", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    request.validate()?;

    let outcome = state
        .services
        .checkout
        .create_intent(user.user_id, request)
        .await?;

    Ok(respond(
        outcome,
        "Order created successfully",
        "Using existing pending order",
    ))
}

/// Create a payment intent from the buyer's stored cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/cart",
    request_body = CartCheckoutInput,
    responses(
        (status = 201, description = "Pending order created from cart", body = crate::ApiResponse<CheckoutResponse>),
        (status = 200, description = "Existing pending order reused", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No valid products in cart", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout_from_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<CartCheckoutInput>>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    // The body is entirely optional; an empty POST checks out with the
    // default currency and payment method.
    let input = payload.map(|Json(p)| p).unwrap_or_default();

    let outcome = state
        .services
        .checkout
        .checkout_cart(user.user_id, input)
        .await?;

    Ok(respond(
        outcome,
        "Cart checkout order created successfully",
        "Using existing pending cart order",
    ))
}

/// Verify a gateway payment confirmation and confirm the order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/verify",
    request_body = VerifyPaymentInput,
    responses(
        (status = 200, description = "Payment verified", body = crate::ApiResponse<VerifiedPayment>),
        (status = 400, description = "Missing verification details", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<VerifyPaymentInput>,
) -> Result<Json<ApiResponse<VerifiedPayment>>, ServiceError> {
    let verified = state.services.payment.verify_payment(request).await?;

    Ok(Json(ApiResponse::success_with_message(
        verified,
        "Payment verified successfully",
    )))
}

/// List the authenticated buyer's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/checkout/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Payment history page", body = crate::ApiResponse<crate::PaginatedResponse<crate::entities::order::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderModel>>>, ServiceError> {
    let page = query.page.max(1);
    let limit = query.limit.max(1);

    let (orders, total) = state
        .services
        .payment
        .get_payment_history(user.user_id, page, limit)
        .await?;

    let response = PaginatedResponse {
        items: orders,
        total,
        page,
        limit,
        total_pages: (total + limit - 1) / limit,
    };

    Ok(Json(ApiResponse::success_with_message(
        response,
        "Payment history retrieved successfully",
    )))
}

/// Picks status code and message off the dedup outcome: a reused pending
/// order answers 200, a freshly created one 201.
fn respond(
    outcome: CheckoutOutcome,
    created_message: &str,
    reused_message: &str,
) -> (StatusCode, Json<ApiResponse<CheckoutResponse>>) {
    let (status, message) = if outcome.reused_existing {
        (StatusCode::OK, reused_message)
    } else {
        (StatusCode::CREATED, created_message)
    };
    (
        status,
        Json(ApiResponse::success_with_message(
            CheckoutResponse::from(outcome),
            message,
        )),
    )
}
