use crate::{
    entities::{
        cart::{self, Entity as Cart, Model as CartModel},
        cart_item::{self, Entity as CartItem, Model as CartItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::ProductCatalogService,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Service for managing per-user shopping carts.
///
/// Each user owns at most one cart, created lazily on first use. Line items
/// capture the listing price at add time; the cart row carries denormalized
/// totals that are recomputed inside the same transaction as every
/// mutation.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: ProductCatalogService,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: ProductCatalogService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            event_sender,
        }
    }

    /// Adds a listing to the user's cart, creating the cart if the user has
    /// none yet.
    ///
    /// The listing must exist, be active, have enough stock, and belong to a
    /// different user. If the cart already holds a line for this listing the
    /// quantities are merged, the captured unit price is refreshed to the
    /// current listing price, and the line's `added_at` is reset.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The cart owner
    /// * `product_id` - The listing to add
    /// * `quantity` - How many to add; must be positive
    ///
    /// # Returns
    ///
    /// The updated cart with its line items and recomputed totals
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "Quantity must be greater than 0".to_string(),
            ));
        }

        let product = self
            .catalog
            .ensure_purchasable(product_id, quantity, user_id)
            .await?;

        let txn = self.db.begin().await?;
        let (cart_row, created) = find_or_create_cart(&txn, user_id).await?;

        let now = Utc::now();
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(line) => {
                let merged = line.quantity + quantity;
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.unit_price = Set(product.price);
                active.added_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_row.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    unit_price: Set(product.price),
                    added_at: Set(now),
                };
                line.insert(&txn).await?;
            }
        }

        let (cart_row, items) = write_back_totals(&txn, cart_row.id).await?;
        txn.commit().await?;

        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart_row.id))
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart_row.id,
                product_id,
            })
            .await;
        info!(
            cart_id = %cart_row.id,
            %product_id,
            quantity,
            "item added to cart"
        );

        self.with_product_detail(cart_row, items).await
    }

    /// Returns the user's cart, creating an empty one on first read.
    ///
    /// Lines whose listing has been deleted, deactivated, or sold out are
    /// pruned before the cart is returned, and the totals are rewritten when
    /// anything was pruned.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let (cart_row, created) = find_or_create_cart(&txn, user_id).await?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&txn)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.catalog.get_products_on(&txn, &product_ids).await?;
        let alive: HashSet<Uuid> = products
            .iter()
            .filter(|p| p.is_active && p.stock > 0)
            .map(|p| p.id)
            .collect();
        let stale: Vec<Uuid> = items
            .iter()
            .filter(|i| !alive.contains(&i.product_id))
            .map(|i| i.product_id)
            .collect();

        let (cart_row, items) = if stale.is_empty() {
            (cart_row, items)
        } else {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart_row.id))
                .filter(cart_item::Column::ProductId.is_in(stale.clone()))
                .exec(&txn)
                .await?;
            write_back_totals(&txn, cart_row.id).await?
        };
        txn.commit().await?;

        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart_row.id))
                .await;
        }
        if !stale.is_empty() {
            self.event_sender
                .send_or_log(Event::CartItemsPruned {
                    cart_id: cart_row.id,
                    removed: stale.len(),
                })
                .await;
            info!(
                cart_id = %cart_row.id,
                removed = stale.len(),
                "pruned unavailable listings from cart"
            );
        }

        self.with_product_detail(cart_row, items).await
    }

    /// Sets a cart line to an exact quantity; zero removes the line.
    ///
    /// Stock is re-checked against the requested quantity (the listing's
    /// active flag and ownership are not; the line got past those gates when
    /// it was added). A quantity for a listing not in the cart is a no-op.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The cart owner
    /// * `product_id` - The listing whose line to change
    /// * `quantity` - The exact quantity to keep; 0 removes, negative is rejected
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let cart_row = self.require_cart(user_id).await?;

        if quantity > 0 {
            self.catalog.ensure_in_stock(product_id, quantity).await?;
        }

        let txn = self.db.begin().await?;
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let mut removed = false;
        let mut touched = false;
        if let Some(line) = existing {
            if quantity == 0 {
                CartItem::delete_by_id(line.id).exec(&txn).await?;
                removed = true;
            } else {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.added_at = Set(Utc::now());
                active.update(&txn).await?;
                touched = true;
            }
        }

        let (cart_row, items) = write_back_totals(&txn, cart_row.id).await?;
        txn.commit().await?;

        if removed {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart_row.id,
                    product_id,
                })
                .await;
        } else if touched {
            self.event_sender
                .send_or_log(Event::CartItemUpdated {
                    cart_id: cart_row.id,
                    product_id,
                })
                .await;
        }
        info!(
            cart_id = %cart_row.id,
            %product_id,
            quantity,
            "cart line updated"
        );

        self.with_product_detail(cart_row, items).await
    }

    /// Removes one listing's line from the cart. Removing a listing that is
    /// not in the cart succeeds without changing anything.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart_row = self.require_cart(user_id).await?;

        let txn = self.db.begin().await?;
        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        let (cart_row, items) = write_back_totals(&txn, cart_row.id).await?;
        txn.commit().await?;

        if deleted.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart_row.id,
                    product_id,
                })
                .await;
        }
        info!(cart_id = %cart_row.id, %product_id, "item removed from cart");

        self.with_product_detail(cart_row, items).await
    }

    /// Empties the cart in one stroke.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart_row = self.require_cart(user_id).await?;

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .exec(&txn)
            .await?;
        let (cart_row, items) = write_back_totals(&txn, cart_row.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_row.id))
            .await;
        info!(cart_id = %cart_row.id, "cart cleared");

        self.with_product_detail(cart_row, items).await
    }

    /// Lightweight totals for badges and headers. Never creates a cart: a
    /// user without one gets zeroed totals.
    #[instrument(skip(self))]
    pub async fn get_summary(&self, user_id: Uuid) -> Result<CartSummary, ServiceError> {
        let cart_row = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;

        let Some(cart_row) = cart_row else {
            return Ok(CartSummary::default());
        };

        let item_count = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_row.id))
            .count(&*self.db)
            .await?;

        Ok(CartSummary {
            total_items: cart_row.total_items,
            total_price: cart_row.total_price,
            item_count,
            last_updated: Some(cart_row.last_updated),
        })
    }

    async fn require_cart(&self, user_id: Uuid) -> Result<CartModel, ServiceError> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))
    }

    /// Joins listing titles onto the cart lines for display.
    async fn with_product_detail(
        &self,
        cart_row: CartModel,
        items: Vec<CartItemModel>,
    ) -> Result<CartWithItems, ServiceError> {
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let titles: HashMap<Uuid, String> = self
            .catalog
            .get_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.title))
            .collect();

        let items = items
            .into_iter()
            .map(|line| CartItemDetail {
                title: titles.get(&line.product_id).cloned(),
                line_total: line.unit_price * Decimal::from(line.quantity),
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                added_at: line.added_at,
            })
            .collect();

        Ok(CartWithItems {
            cart: cart_row,
            items,
        })
    }
}

/// Finds the user's cart or inserts an empty one. The second element is
/// true when a cart was created, so callers can emit the creation event
/// after their transaction commits.
async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(CartModel, bool), ServiceError> {
    if let Some(existing) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok((existing, false));
    }

    let now = Utc::now();
    let fresh = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_items: Set(0),
        total_price: Set(Decimal::ZERO),
        last_updated: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let model = fresh.insert(conn).await?;
    Ok((model, true))
}

/// Re-reads the cart's lines and rewrites the denormalized totals. Must run
/// inside the same transaction as the mutation that invalidated them.
async fn write_back_totals<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<(CartModel, Vec<CartItemModel>), ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::AddedAt)
        .all(conn)
        .await?;
    let totals = cart_totals(&items);

    let cart_row = Cart::find_by_id(cart_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

    let now = Utc::now();
    let mut active: cart::ActiveModel = cart_row.into();
    active.total_items = Set(totals.total_items);
    active.total_price = Set(totals.total_price);
    active.last_updated = Set(now);
    active.updated_at = Set(now);
    let cart_row = active.update(conn).await?;

    Ok((cart_row, items))
}

/// Derived totals of a set of cart lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    pub total_items: i32,
    pub total_price: Decimal,
}

/// Computes cart totals from line items: `total_items` is the sum of
/// quantities, `total_price` the sum of quantity times captured unit price.
pub fn cart_totals(items: &[CartItemModel]) -> CartTotals {
    let total_items = items.iter().map(|i| i.quantity).sum();
    let total_price = items
        .iter()
        .map(|i| i.unit_price * Decimal::from(i.quantity))
        .sum();
    CartTotals {
        total_items,
        total_price,
    }
}

/// A cart together with its lines, titles joined on for display.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartWithItems {
    #[serde(flatten)]
    pub cart: CartModel,
    pub items: Vec<CartItemDetail>,
}

impl CartWithItems {
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            total_items: self.cart.total_items,
            total_price: self.cart.total_price,
            item_count: self.items.len() as u64,
            last_updated: Some(self.cart.last_updated),
        }
    }
}

/// One cart line as shown to the user. `title` is `None` when the listing
/// vanished between the read and the join.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartItemDetail {
    pub product_id: Uuid,
    pub title: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub added_at: DateTime<Utc>,
}

/// Totals without the line detail.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CartSummary {
    pub total_items: i32,
    pub total_price: Decimal,
    pub item_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}
