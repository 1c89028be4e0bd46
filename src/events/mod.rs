use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// closed or full. Event delivery is best-effort; the originating
    /// operation has already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// The events that can occur in the cart-to-checkout pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemUpdated {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),
    CartItemsPruned {
        cart_id: Uuid,
        removed: usize,
    },

    // Checkout events
    OrderCreated(Uuid),
    CheckoutDeduplicated {
        order_id: Uuid,
        intent_id: String,
    },
    PaymentIntentCreated {
        order_id: Uuid,
        intent_id: String,
    },

    // Payment events
    OrderConfirmed(Uuid),
    SignatureRejected {
        intent_id: String,
    },

    // Maintenance events
    AbandonedOrdersPurged {
        count: u64,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Consumes the event channel and logs each event with enough structure for
// downstream log-based alerting. Runs until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CartCreated(cart_id) => {
                info!(%cart_id, "cart created");
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item added");
            }
            Event::CartItemUpdated {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item updated");
            }
            Event::CartItemRemoved {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item removed");
            }
            Event::CartCleared(cart_id) => {
                info!(%cart_id, "cart cleared");
            }
            Event::CartItemsPruned { cart_id, removed } => {
                info!(%cart_id, removed, "unavailable items pruned from cart");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::CheckoutDeduplicated {
                order_id,
                intent_id,
            } => {
                info!(%order_id, %intent_id, "checkout reused in-flight order");
            }
            Event::PaymentIntentCreated {
                order_id,
                intent_id,
            } => {
                info!(%order_id, %intent_id, "payment intent created");
            }
            Event::OrderConfirmed(order_id) => {
                info!(%order_id, "order confirmed");
            }
            Event::SignatureRejected { intent_id } => {
                warn!(%intent_id, "payment confirmation rejected: signature mismatch");
            }
            Event::AbandonedOrdersPurged { count } => {
                info!(count, "abandoned pending orders purged");
            }
            Event::Generic { message, .. } => {
                info!("{}", message);
            }
        }
    }

    info!("Event processing loop stopped");
}
