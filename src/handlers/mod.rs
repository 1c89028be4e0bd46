pub mod carts;
pub mod checkout;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::{CartService, CheckoutService, PaymentService, ProductCatalogService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: ProductCatalogService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub payment: PaymentService,
}

impl AppServices {
    /// Wires every service against one connection pool, one gateway client
    /// and one event channel.
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let catalog = ProductCatalogService::new(db_pool.clone());
        let cart = CartService::new(db_pool.clone(), catalog.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db_pool.clone(),
            gateway.clone(),
            catalog.clone(),
            event_sender.clone(),
            config,
        );
        let payment = PaymentService::new(db_pool, gateway, event_sender);

        Self {
            catalog,
            cart,
            checkout,
            payment,
        }
    }
}
