//! In-memory backend with failure injection.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{OrderRepository, ProductCatalog, SessionResolver, StoreResult, UserCartRepository};
use crate::domain::aggregates::{CartItem, Order, Product};
use crate::domain::value_objects::{CartItemId, OrderId, ProductId, Quantity, UserId};
use crate::error::StoreError;

#[derive(Default)]
struct Failures {
    catalog: bool,
    add_for_product: Option<ProductId>,
    cart_writes: bool,
    cart_clear: bool,
    order_insert: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<ProductId, Product>>,
    carts: RwLock<HashMap<(UserId, ProductId), CartItem>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    sessions: RwLock<HashMap<String, UserId>>,
    failures: RwLock<Failures>,
}

fn injected(what: &str) -> StoreError { StoreError::Unavailable(format!("injected failure: {what}")) }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    /// Simulates an admin editing prices after the fact.
    pub async fn set_prices(&self, id: ProductId, regular: Decimal, offer: Option<Decimal>) {
        if let Some(p) = self.products.write().await.get_mut(&id) {
            p.price_regular = regular;
            p.price_offer = offer;
        }
    }

    pub async fn add_session(&self, token: impl Into<String>, user: UserId) {
        self.sessions.write().await.insert(token.into(), user);
    }

    pub async fn set_fail_catalog(&self, fail: bool) {
        self.failures.write().await.catalog = fail;
    }

    pub async fn set_fail_on_add_for(&self, product: Option<ProductId>) {
        self.failures.write().await.add_for_product = product;
    }

    pub async fn set_fail_cart_writes(&self, fail: bool) {
        self.failures.write().await.cart_writes = fail;
    }

    /// Fails both `clear` and `remove_ordered`.
    pub async fn set_fail_cart_clear(&self, fail: bool) {
        self.failures.write().await.cart_clear = fail;
    }

    pub async fn set_fail_order_insert(&self, fail: bool) {
        self.failures.write().await.order_insert = fail;
    }

    pub async fn order_count(&self) -> usize { self.orders.read().await.len() }

    pub async fn cart_rows(&self, user: UserId) -> Vec<CartItem> {
        let mut rows: Vec<_> = self.carts.read().await.values().filter(|c| c.user_id == user).cloned().collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        rows
    }

    async fn check_catalog(&self) -> StoreResult<()> {
        if self.failures.read().await.catalog {
            return Err(injected("catalog read"));
        }
        Ok(())
    }

    async fn check_cart_write(&self, product: ProductId) -> StoreResult<()> {
        let failures = self.failures.read().await;
        if failures.cart_writes || failures.add_for_product == Some(product) {
            return Err(injected("cart write"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        self.check_catalog().await?;
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        self.check_catalog().await?;
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

#[async_trait]
impl UserCartRepository for MemoryStore {
    async fn lines(&self, user: UserId) -> StoreResult<Vec<(CartItem, Product)>> {
        let products = self.products.read().await;
        Ok(self
            .cart_rows(user)
            .await
            .into_iter()
            .filter_map(|row| products.get(&row.product_id).cloned().map(|p| (row, p)))
            .collect())
    }

    async fn add(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<CartItem> {
        self.check_cart_write(product).await?;
        let now = Utc::now();
        let mut carts = self.carts.write().await;
        if let Some(row) = carts.get_mut(&(user, product)) {
            row.quantity = row.quantity.checked_add(quantity).map_err(|_| StoreError::QuantityOverflow(product))?;
            row.updated_at = now;
            return Ok(row.clone());
        }
        let row = CartItem { id: CartItemId::new(), user_id: user, product_id: product, quantity, created_at: now, updated_at: now };
        carts.insert((user, product), row.clone());
        Ok(row)
    }

    async fn set_quantity(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<Option<CartItem>> {
        self.check_cart_write(product).await?;
        let mut carts = self.carts.write().await;
        Ok(carts.get_mut(&(user, product)).map(|row| {
            row.quantity = quantity;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn remove(&self, user: UserId, product: ProductId) -> StoreResult<bool> {
        self.check_cart_write(product).await?;
        Ok(self.carts.write().await.remove(&(user, product)).is_some())
    }

    async fn clear(&self, user: UserId) -> StoreResult<u64> {
        if self.failures.read().await.cart_clear {
            return Err(injected("cart clear"));
        }
        let mut carts = self.carts.write().await;
        let before = carts.len();
        carts.retain(|(owner, _), _| *owner != user);
        Ok((before - carts.len()) as u64)
    }

    async fn remove_ordered(&self, user: UserId, ordered: &[(ProductId, Quantity)]) -> StoreResult<u64> {
        if self.failures.read().await.cart_clear {
            return Err(injected("cart clear"));
        }
        let mut carts = self.carts.write().await;
        let mut touched = 0;
        for (product, quantity) in ordered {
            let key = (user, *product);
            let Some(row) = carts.get_mut(&key) else { continue };
            match row.quantity.checked_sub(*quantity) {
                Some(left) => {
                    row.quantity = left;
                    row.updated_at = Utc::now();
                }
                None => {
                    carts.remove(&key);
                }
            }
            touched += 1;
        }
        Ok(touched)
    }

    /// Rows whose product is gone are not counted, matching `lines`.
    async fn count(&self, user: UserId) -> StoreResult<u32> {
        let products = self.products.read().await;
        Ok(self
            .carts
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user && products.contains_key(&c.product_id))
            .fold(0u32, |acc, c| acc.saturating_add(c.quantity.value())))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        if self.failures.read().await.order_insert {
            return Err(injected("order insert"));
        }
        self.orders.write().await.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save_status(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id()).ok_or_else(|| StoreError::InvalidRow(format!("order {} not found", order.id())))?;
        stored.status = order.status();
        stored.payment_status = order.payment_status();
        Ok(())
    }
}

#[async_trait]
impl SessionResolver for MemoryStore {
    async fn current_user(&self, token: &str) -> StoreResult<Option<UserId>> {
        Ok(self.sessions.read().await.get(token).copied())
    }
}
