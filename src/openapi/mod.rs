use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the bearer JWT scheme the path annotations reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SellX API",
        version = "0.3.0",
        description = r#"
# SellX Marketplace API

The checkout backbone of the SellX second-hand marketplace: per-buyer
carts, gateway-backed checkout, and signed payment verification.

## Features

- **Cart**: one cart per buyer, price captured at add time, totals
  recomputed on every mutation
- **Checkout**: converts an item list or the stored cart into a pending
  order with a gateway payment intent; double-submits inside a short
  window reuse the in-flight order
- **Payment verification**: authenticates the gateway's signed
  confirmation and finalizes the order exactly once
- **Payment history**: paginated listing of a buyer's orders

## Authentication

All cart and checkout endpoints require a bearer JWT issued by the SellX
account service:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Failures use a consistent error body with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Quantity must be greater than 0",
  "timestamp": "2025-01-01T00:00:00Z"
}
```
        "#,
        contact(
            name = "SellX Engineering",
            email = "engineering@sellx.app",
            url = "https://sellx.app"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://api.sellx.app", description = "Production server"),
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Per-buyer cart management"),
        (name = "Checkout", description = "Checkout, payment verification and history"),
        (name = "Health", description = "Health check endpoints")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Cart
        crate::handlers::carts::add_item,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::get_cart_summary,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,

        // Checkout
        crate::handlers::checkout::create_checkout,
        crate::handlers::checkout::checkout_from_cart,
        crate::handlers::checkout::verify_payment,
        crate::handlers::checkout::payment_history,

        // Health
        crate::api_status,
        crate::health_check,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Cart types
            crate::handlers::carts::AddItemRequest,
            crate::handlers::carts::UpdateQuantityRequest,
            crate::handlers::carts::CartResponse,
            crate::services::cart_service::CartWithItems,
            crate::services::cart_service::CartItemDetail,
            crate::services::cart_service::CartSummary,
            crate::entities::cart::Model,

            // Checkout types
            crate::handlers::checkout::CheckoutResponse,
            crate::services::checkout_service::CheckoutInput,
            crate::services::checkout_service::CheckoutItemInput,
            crate::services::checkout_service::CartCheckoutInput,
            crate::services::payment_service::VerifyPaymentInput,
            crate::services::payment_service::VerifiedPayment,
            crate::gateway::PaymentIntent,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::OrderType,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
