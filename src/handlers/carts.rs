use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::cart_service::{CartSummary, CartWithItems};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for cart endpoints. Every route acts on the
/// authenticated buyer's own cart; there is no cart id in the URL.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/summary", get(get_cart_summary))
        .route("/items", post(add_item))
        .route("/items/:product_id", put(update_item).delete(remove_item))
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "product_id": "550e8400-e29b-41d4-a716-446655440000",
    "quantity": 2
}))]
pub struct AddItemRequest {
    /// Listing to add to the cart
    pub product_id: Option<Uuid>,
    /// How many to add; defaults to 1
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({ "quantity": 3 }))]
pub struct UpdateQuantityRequest {
    /// New quantity for the line; 0 removes it
    pub quantity: i32,
}

/// A cart plus its derived summary, the payload every cart mutation
/// returns.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub cart: CartWithItems,
    pub summary: CartSummary,
}

impl From<CartWithItems> for CartResponse {
    fn from(cart: CartWithItems) -> Self {
        let summary = cart.summary();
        Self { cart, summary }
    }
}

// Handler functions

/// Add an item to the authenticated buyer's cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Item added", body = crate::ApiResponse<CartResponse>),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let product_id = request
        .product_id
        .ok_or_else(|| ServiceError::InvalidInput("Product ID is required".to_string()))?;

    let cart = state
        .services
        .cart
        .add_item(user.user_id, product_id, request.quantity)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        CartResponse::from(cart),
        "Item added to cart successfully",
    )))
}

/// Get the authenticated buyer's cart with items and summary
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart contents", body = crate::ApiResponse<CartResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        CartResponse::from(cart),
        "Cart retrieved successfully",
    )))
}

/// Get the cart totals without the line detail
#[utoipa::path(
    get,
    path = "/api/v1/cart/summary",
    responses(
        (status = 200, description = "Cart summary", body = crate::ApiResponse<CartSummary>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<CartSummary>>, ServiceError> {
    let summary = state.services.cart.get_summary(user.user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        summary,
        "Cart summary retrieved successfully",
    )))
}

/// Set the quantity of a cart line; 0 removes the line
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/:product_id",
    params(
        ("product_id" = Uuid, Path, description = "Listing whose cart line to update")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Cart updated", body = crate::ApiResponse<CartResponse>),
        (status = 400, description = "Bad request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let cart = state
        .services
        .cart
        .update_item_quantity(user.user_id, product_id, request.quantity)
        .await?;

    let message = if request.quantity > 0 {
        "Cart item updated successfully"
    } else {
        "Item removed from cart"
    };
    Ok(Json(ApiResponse::success_with_message(
        CartResponse::from(cart),
        message,
    )))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/:product_id",
    params(
        ("product_id" = Uuid, Path, description = "Listing whose cart line to remove")
    ),
    responses(
        (status = 200, description = "Item removed", body = crate::ApiResponse<CartResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(user.user_id, product_id)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        CartResponse::from(cart),
        "Item removed from cart successfully",
    )))
}

/// Empty the cart, keeping the cart record itself
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart cleared", body = crate::ApiResponse<CartResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let cart = state.services.cart.clear_cart(user.user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        CartResponse::from(cart),
        "Cart cleared successfully",
    )))
}
