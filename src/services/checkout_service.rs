use crate::{
    config::AppConfig,
    entities::{
        cart::{self, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        order::{self, Entity as Order, OrderStatus, OrderType, PaymentStatus},
        order_item::{self, Entity as OrderItem},
        product::Model as ProductModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateIntentRequest, PaymentGateway, PaymentIntent},
    services::ProductCatalogService,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Orchestrates the conversion of items into a pending order backed by a
/// gateway payment intent.
///
/// Two entry points share one pipeline: [`create_intent`] takes an inline
/// item list with a declared total, [`checkout_cart`] reads the buyer's
/// server-side cart. Both guard against double-submits by reusing a
/// matching pending order created inside the dedup window, and both run
/// the guard and the order insert inside a single transaction.
///
/// [`create_intent`]: CheckoutService::create_intent
/// [`checkout_cart`]: CheckoutService::checkout_cart
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: ProductCatalogService,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: ProductCatalogService,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            catalog,
            event_sender,
            config,
        }
    }

    /// Ad-hoc checkout: turns an inline item list and a declared total into
    /// a pending order with a gateway intent.
    ///
    /// Item prices are snapshotted from the live listings; the declared
    /// total is what gets charged.
    ///
    /// # Arguments
    ///
    /// * `buyer_id` - The authenticated buyer
    /// * `input` - Items, declared total and optional currency
    ///
    /// # Returns
    ///
    /// The gateway intent plus the persisted (or reused) order's ids
    #[instrument(skip(self, input), fields(%buyer_id))]
    pub async fn create_intent(
        &self,
        buyer_id: Uuid,
        input: CheckoutInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Items array is required".to_string(),
            ));
        }
        if input.total_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Valid total amount is required".to_string(),
            ));
        }

        let lines: Vec<CheckoutLine> = input
            .items
            .iter()
            .map(|item| CheckoutLine {
                product_id: item.product_id,
                quantity: item.quantity,
                captured_price: None,
            })
            .collect();
        let currency = input
            .currency
            .unwrap_or_else(|| self.config.default_currency.clone());

        self.run_pipeline(PipelineRequest {
            buyer_id,
            lines,
            total_amount: input.total_amount,
            currency,
            receipt: format!("order_{}", Utc::now().timestamp_millis()),
            reused_receipt_prefix: "existing_",
            empty_batch_message: "No valid products found",
            payment_method: None,
        })
        .await
    }

    /// Cart checkout: converts the buyer's server-side cart into a pending
    /// order with a gateway intent. The cart itself is left untouched; the
    /// client clears it once payment goes through.
    ///
    /// Line prices are the ones captured when each item entered the cart,
    /// and the charged total is their sum.
    #[instrument(skip(self, input), fields(%user_id))]
    pub async fn checkout_cart(
        &self,
        user_id: Uuid,
        input: CartCheckoutInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let method = input
            .payment_method
            .unwrap_or_else(|| "razorpay".to_string());
        if method != "razorpay" {
            return Err(ServiceError::InvalidInput(
                "Unsupported payment method".to_string(),
            ));
        }

        let cart_row = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        let items = match &cart_row {
            Some(cart_row) => {
                CartItem::find()
                    .filter(cart_item::Column::CartId.eq(cart_row.id))
                    .all(&*self.db)
                    .await?
            }
            None => Vec::new(),
        };
        if items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Cart items are required".to_string(),
            ));
        }

        let total_amount: Decimal = items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();
        if total_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Valid total amount is required".to_string(),
            ));
        }

        let lines: Vec<CheckoutLine> = items
            .iter()
            .map(|item| CheckoutLine {
                product_id: item.product_id,
                quantity: item.quantity,
                captured_price: Some(item.unit_price),
            })
            .collect();

        self.run_pipeline(PipelineRequest {
            buyer_id: user_id,
            lines,
            total_amount,
            currency: input
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone()),
            receipt: format!("cart_{}_{}", user_id, Utc::now().timestamp_millis()),
            reused_receipt_prefix: "existing_cart_",
            empty_batch_message: "No valid products found in cart",
            payment_method: Some(method),
        })
        .await
    }

    /// Deletes pending orders whose payment never arrived. Returns how many
    /// were removed; their item snapshots go with them.
    #[instrument(skip(self))]
    pub async fn purge_abandoned_orders(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.config.abandoned_order_retention();
        let result = Order::delete_many()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            counter!("sellx_checkout.abandoned_purged", result.rows_affected);
            self.event_sender
                .send_or_log(Event::AbandonedOrdersPurged {
                    count: result.rows_affected,
                })
                .await;
            info!(count = result.rows_affected, "purged abandoned pending orders");
        }
        Ok(result.rows_affected)
    }

    async fn run_pipeline(&self, request: PipelineRequest) -> Result<CheckoutOutcome, ServiceError> {
        for line in &request.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidInput(
                    "Quantity must be greater than 0".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;

        // Dedup guard: an equal-amount pending order by this buyer inside
        // the window answers the request instead of a new order.
        let window = self.config.dedup_window();
        let existing = Order::find()
            .filter(order::Column::BuyerId.eq(request.buyer_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::OrderType.eq(OrderType::FromCart))
            .filter(order::Column::TotalAmount.eq(request.total_amount))
            .filter(order::Column::CreatedAt.gte(Utc::now() - window))
            .filter(order::Column::PaymentIntentId.is_not_null())
            .one(&txn)
            .await?;

        if let Some(existing) = existing {
            txn.commit().await?;
            let intent_id = existing.payment_intent_id.clone().ok_or_else(|| {
                ServiceError::InternalError("Pending order has no payment intent".to_string())
            })?;
            let amount_minor = to_minor_units(existing.total_amount).ok_or_else(|| {
                ServiceError::InternalError("Order amount out of range".to_string())
            })?;

            counter!("sellx_checkout.dedup_hits", 1);
            self.event_sender
                .send_or_log(Event::CheckoutDeduplicated {
                    order_id: existing.id,
                    intent_id: intent_id.clone(),
                })
                .await;
            info!(order_id = %existing.id, %intent_id, "reusing in-flight pending order");

            return Ok(CheckoutOutcome {
                order_id: existing.id,
                order_number: existing.order_number.clone(),
                intent: PaymentIntent {
                    id: intent_id,
                    amount_minor,
                    currency: existing.currency.clone(),
                    receipt: format!("{}{}", request.reused_receipt_prefix, existing.id),
                    status: "created".to_string(),
                },
                reused_existing: true,
            });
        }

        // Resolve sellers from the live listings, on the guard's transaction.
        let product_ids: Vec<Uuid> = request.lines.iter().map(|l| l.product_id).collect();
        let products = self.catalog.get_products_on(&txn, &product_ids).await?;
        if products.is_empty() {
            return Err(ServiceError::NotFound(
                request.empty_batch_message.to_string(),
            ));
        }
        let products_by_id: HashMap<Uuid, ProductModel> =
            products.into_iter().map(|p| (p.id, p)).collect();

        let groups = partition_by_seller(&request.lines, &products_by_id)?;
        // Single-seller limitation: only the first seller's items become an
        // order. TODO: split multi-seller checkouts into one order per seller.
        let group = groups.first().ok_or_else(|| {
            ServiceError::NotFound(request.empty_batch_message.to_string())
        })?;
        if groups.len() > 1 {
            warn!(
                sellers = groups.len(),
                kept_seller = %group.seller_id,
                "multi-seller checkout collapsed to first seller"
            );
        }

        let amount_minor = to_minor_units(request.total_amount).ok_or_else(|| {
            ServiceError::InvalidInput("Valid total amount is required".to_string())
        })?;
        let intent = self
            .gateway
            .create_intent(CreateIntentRequest {
                amount_minor,
                currency: request.currency.clone(),
                receipt: request.receipt.clone(),
            })
            .await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_row = order::ActiveModel {
            id: Set(order_id),
            // The gateway receipt doubles as the order number; the unique
            // index turns a same-millisecond double insert into an error.
            order_number: Set(request.receipt.clone()),
            buyer_id: Set(request.buyer_id),
            seller_id: Set(group.seller_id),
            item_name: Set(order_display_name(group)),
            total_quantity: Set(group.lines.iter().map(|l| l.quantity).sum()),
            order_type: Set(OrderType::FromCart),
            total_amount: Set(request.total_amount),
            currency: Set(request.currency.clone()),
            payment_intent_id: Set(Some(intent.id.clone())),
            payment_id: Set(None),
            payment_signature: Set(None),
            payment_method: Set(request.payment_method.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            paid_at: Set(None),
        };
        order_row.insert(&txn).await?;

        let snapshots: Vec<order_item::ActiveModel> = group
            .lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                title: Set(line.title.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.unit_price * Decimal::from(line.quantity)),
            })
            .collect();
        OrderItem::insert_many(snapshots).exec(&txn).await?;

        txn.commit().await?;

        counter!("sellx_checkout.orders_created", 1);
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                order_id,
                intent_id: intent.id.clone(),
            })
            .await;
        info!(
            %order_id,
            intent_id = %intent.id,
            seller_id = %group.seller_id,
            amount_minor,
            "pending order created"
        );

        Ok(CheckoutOutcome {
            order_id,
            order_number: request.receipt,
            intent,
            reused_existing: false,
        })
    }
}

/// What a checkout entry point hands to the shared pipeline.
struct PipelineRequest {
    buyer_id: Uuid,
    lines: Vec<CheckoutLine>,
    total_amount: Decimal,
    currency: String,
    receipt: String,
    reused_receipt_prefix: &'static str,
    empty_batch_message: &'static str,
    payment_method: Option<String>,
}

/// One requested line before seller resolution. `captured_price` is the
/// cart-captured unit price; `None` means snapshot the live listing price.
#[derive(Debug, Clone)]
struct CheckoutLine {
    product_id: Uuid,
    quantity: i32,
    captured_price: Option<Decimal>,
}

/// Lines of one seller, priced and titled for snapshotting.
#[derive(Debug, Clone)]
struct SellerGroup {
    seller_id: Uuid,
    lines: Vec<PricedLine>,
}

#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    quantity: i32,
    title: String,
    unit_price: Decimal,
}

/// Groups requested lines by the owning seller, preserving first-seen
/// seller order. Every line must resolve to a fetched product.
fn partition_by_seller(
    lines: &[CheckoutLine],
    products_by_id: &HashMap<Uuid, ProductModel>,
) -> Result<Vec<SellerGroup>, ServiceError> {
    let mut groups: Vec<SellerGroup> = Vec::new();
    for line in lines {
        let product = products_by_id.get(&line.product_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Product with ID {} not found", line.product_id))
        })?;
        let priced = PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            title: product.title.clone(),
            unit_price: line.captured_price.unwrap_or(product.price),
        };
        match groups.iter_mut().find(|g| g.seller_id == product.seller_id) {
            Some(group) => group.lines.push(priced),
            None => groups.push(SellerGroup {
                seller_id: product.seller_id,
                lines: vec![priced],
            }),
        }
    }
    Ok(groups)
}

/// Display name for an order: the single item's title, or a count when the
/// seller group spans several lines.
fn order_display_name(group: &SellerGroup) -> String {
    if group.lines.len() > 1 {
        format!("Cart Order ({} items)", group.lines.len())
    } else {
        group.lines[0].title.clone()
    }
}

/// Converts a major-unit amount into the gateway's minor units, rounding
/// halves away from zero. `None` when the amount does not fit in an `i64`.
fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Ad-hoc checkout request: inline items plus the declared total to charge.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutInput {
    #[validate(length(min = 1, message = "Items array is required"))]
    pub items: Vec<CheckoutItemInput>,
    pub total_amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutItemInput {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Cart checkout request. The item list and total come from the stored
/// cart, so the body only tunes currency and payment method.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CartCheckoutInput {
    pub currency: Option<String>,
    pub payment_method: Option<String>,
}

/// What a checkout produced: the gateway intent to hand to the client and
/// the pending order behind it. `reused_existing` is set when the dedup
/// guard answered with an in-flight order instead of creating one.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub order_number: String,
    pub intent: PaymentIntent,
    pub reused_existing: bool,
}
