pub mod razorpay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

pub use razorpay::RazorpayClient;

/// Request to open a payment intent with the gateway.
#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    /// Amount in the currency's minor unit (paise for INR)
    pub amount_minor: i64,
    pub currency: String,
    /// Caller-supplied reference echoed back by the gateway
    pub receipt: String,
}

/// Payment intent as returned by the gateway. The client uses the id and
/// amount to launch the gateway's payment UI.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in the currency's minor unit
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
}

/// Payment gateway abstraction. The production implementation talks to
/// Razorpay; tests substitute a fake so checkout and verification logic
/// can run without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent for the given amount.
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Check a payment confirmation signature against the shared secret.
    fn verify_signature(&self, intent_id: &str, payment_id: &str, signature: &str) -> bool;
}
