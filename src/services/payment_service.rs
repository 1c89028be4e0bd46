use crate::{
    entities::order::{self, Entity as Order, Model as OrderModel, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::PaymentGateway,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Finalizes pending orders against signed gateway confirmations and serves
/// the buyer's payment history.
///
/// Verification is the only code path that moves an order out of `pending`.
/// The signature is checked before the order lookup, so a forged payload
/// learns nothing about which intent ids exist.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Verifies a gateway payment confirmation and confirms the matching
    /// order.
    ///
    /// The confirmation triple must be complete and its signature must match
    /// our own HMAC over `intent_id|payment_id`. On success the order is
    /// stamped paid and confirmed. Replaying a confirmation for an order
    /// that is already completed returns the stored confirmation without
    /// touching the row.
    ///
    /// # Arguments
    ///
    /// * `input` - Intent id, payment id and signature as posted back by
    ///   the client after the gateway flow
    ///
    /// # Returns
    ///
    /// Confirmation data for the (now) completed order
    #[instrument(skip(self, input))]
    pub async fn verify_payment(
        &self,
        input: VerifyPaymentInput,
    ) -> Result<VerifiedPayment, ServiceError> {
        if details_missing(&input) {
            return Err(ServiceError::InvalidInput(
                "Payment verification details are required".to_string(),
            ));
        }

        if !self
            .gateway
            .verify_signature(&input.intent_id, &input.payment_id, &input.signature)
        {
            counter!("sellx_payment.signatures_rejected", 1);
            self.event_sender
                .send_or_log(Event::SignatureRejected {
                    intent_id: input.intent_id.clone(),
                })
                .await;
            warn!(intent_id = %input.intent_id, "payment signature mismatch");
            return Err(ServiceError::SignatureVerificationFailed(
                "Invalid payment signature".to_string(),
            ));
        }

        let order_row = Order::find()
            .filter(order::Column::PaymentIntentId.eq(input.intent_id.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        // A replayed confirmation for a settled order is answered from the
        // stored state; `paid_at` and the snapshots stay as they are.
        if order_row.payment_status == PaymentStatus::Completed {
            info!(order_id = %order_row.id, "order already confirmed, replay ignored");
            return Ok(VerifiedPayment::from(order_row));
        }

        let order_id = order_row.id;
        let now = Utc::now();
        let mut active: order::ActiveModel = order_row.into();
        active.payment_id = Set(Some(input.payment_id.clone()));
        active.payment_signature = Set(Some(input.signature.clone()));
        active.payment_status = Set(PaymentStatus::Completed);
        active.status = Set(OrderStatus::Confirmed);
        active.paid_at = Set(Some(now));
        active.updated_at = Set(now);
        let confirmed = active.update(&*self.db).await?;

        counter!("sellx_payment.orders_confirmed", 1);
        self.event_sender
            .send_or_log(Event::OrderConfirmed(order_id))
            .await;
        info!(%order_id, payment_id = %input.payment_id, "order confirmed");

        Ok(VerifiedPayment::from(confirmed))
    }

    /// Pages through a buyer's orders, newest first.
    ///
    /// # Arguments
    ///
    /// * `buyer_id` - The buyer whose orders to list
    /// * `page` - One-based page number; zero is treated as one
    /// * `limit` - Page size; zero is treated as one
    ///
    /// # Returns
    ///
    /// The requested page of orders and the buyer's total order count
    #[instrument(skip(self))]
    pub async fn get_payment_history(
        &self,
        buyer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let page = page.max(1);
        let limit = limit.max(1);

        let paginator = Order::find()
            .filter(order::Column::BuyerId.eq(buyer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok((orders, total))
    }
}

fn details_missing(input: &VerifyPaymentInput) -> bool {
    input.intent_id.trim().is_empty()
        || input.payment_id.trim().is_empty()
        || input.signature.trim().is_empty()
}

/// Signed confirmation triple posted back by the client once the gateway
/// flow finishes. Missing fields deserialize to empty strings so the
/// verifier can reject every incomplete payload with one uniform message.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyPaymentInput {
    #[serde(default)]
    pub intent_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
}

/// Confirmation data handed back after a successful (or replayed)
/// verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifiedPayment {
    pub order_id: Uuid,
    pub payment_id: Option<String>,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<OrderModel> for VerifiedPayment {
    fn from(order: OrderModel) -> Self {
        Self {
            order_id: order.id,
            payment_id: order.payment_id,
            status: "success".to_string(),
            paid_at: order.paid_at,
        }
    }
}
