use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, instrument};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

use super::{CreateIntentRequest, PaymentGateway, PaymentIntent};

type HmacSha256 = Hmac<Sha256>;

/// Razorpay Orders API client.
///
/// Intents map to Razorpay "orders": `POST /v1/orders` with basic auth on
/// the key pair. Confirmation signatures are HMAC-SHA256 over
/// `"{intent_id}|{payment_id}"` keyed with the key secret, hex-encoded.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    api_base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    /// 1 = capture automatically on authorization
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
    status: String,
}

impl RazorpayClient {
    /// Build a client using a default reqwest client with the configured timeout.
    pub fn new(config: &GatewayConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!(
                    "failed to construct gateway HTTP client: {}",
                    e
                ))
            })?;

        Ok(Self::with_client(config, client))
    }

    /// Build a client from an existing reqwest client (useful for testing).
    pub fn with_client(config: &GatewayConfig, client: Client) -> Self {
        Self {
            client,
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sign(&self, intent_id: &str, payment_id: &str) -> String {
        hmac_hex(&self.key_secret, &format!("{}|{}", intent_id, payment_id))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let url = format!("{}/v1/orders", self.api_base_url);
        let body = CreateOrderBody {
            amount: request.amount_minor,
            currency: &request.currency,
            receipt: &request.receipt,
            payment_capture: 1,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment gateway request failed: {}", e);
                ServiceError::ExternalServiceError(format!(
                    "Payment gateway request failed: {}",
                    e
                ))
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "Failed to read payment gateway response: {}",
                e
            ))
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            error!(status = %status, "Payment gateway returned an error: {}", text);
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment gateway error (status {})",
                status
            )));
        }

        let order: OrderResponse = serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "Failed to parse payment gateway response: {}",
                e
            ))
        })?;

        Ok(PaymentIntent {
            id: order.id,
            amount_minor: order.amount,
            currency: order.currency,
            receipt: order.receipt.unwrap_or_else(|| request.receipt.clone()),
            status: order.status,
        })
    }

    fn verify_signature(&self, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = self.sign(intent_id, payment_id);
        constant_time_eq(&expected, signature)
    }
}

fn hmac_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
