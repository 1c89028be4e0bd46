use crate::{
    entities::product::{self, Entity as Product, Model as ProductModel},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-side view of the product catalog.
///
/// Listing CRUD belongs to the catalog service; this module only answers
/// the questions the cart and checkout flows ask: does the listing exist,
/// is it live, is there stock, and who sells it.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a single listing by id.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        let found = Product::find_by_id(product_id).one(&*self.db).await?;
        Ok(found)
    }

    /// Batch-fetches listings by id. Absent ids are simply missing from the
    /// result; callers decide whether that is an error.
    #[instrument(skip(self, product_ids), fields(requested = product_ids.len()))]
    pub async fn get_products(&self, product_ids: &[Uuid]) -> Result<Vec<ProductModel>, ServiceError> {
        self.get_products_on(&*self.db, product_ids).await
    }

    /// Batch fetch on a caller-supplied connection. Callers holding an open
    /// transaction must use this so the read runs on the transaction's
    /// connection instead of waiting on the pool.
    pub async fn get_products_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_ids: &[Uuid],
    ) -> Result<Vec<ProductModel>, ServiceError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = Product::find()
            .filter(product::Column::Id.is_in(product_ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(found)
    }

    /// Gate for adding a listing to a buyer's cart. Returns the listing so
    /// the caller can capture its current price.
    #[instrument(skip(self))]
    pub async fn ensure_purchasable(
        &self,
        product_id: Uuid,
        quantity: i32,
        buyer_id: Uuid,
    ) -> Result<ProductModel, ServiceError> {
        let product = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;
        check_purchasable(&product, quantity, buyer_id)?;
        Ok(product)
    }

    /// Gate for setting a cart line to an exact quantity. Unlike the add
    /// gate this does not care whether the listing is still active or who
    /// sells it; only stock is re-checked.
    #[instrument(skip(self))]
    pub async fn ensure_in_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<ProductModel, ServiceError> {
        let product = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;
        check_in_stock(&product, quantity)?;
        Ok(product)
    }
}

fn check_purchasable(
    product: &ProductModel,
    quantity: i32,
    buyer_id: Uuid,
) -> Result<(), ServiceError> {
    if !product.is_active {
        return Err(ServiceError::InvalidInput(
            "Product is not available".to_string(),
        ));
    }
    check_in_stock(product, quantity)?;
    if product.seller_id == buyer_id {
        return Err(ServiceError::InvalidInput(
            "You cannot add your own product to cart".to_string(),
        ));
    }
    Ok(())
}

fn check_in_stock(product: &ProductModel, quantity: i32) -> Result<(), ServiceError> {
    if product.stock < quantity {
        return Err(ServiceError::InvalidInput(format!(
            "Only {} items available in stock",
            product.stock
        )));
    }
    Ok(())
}
