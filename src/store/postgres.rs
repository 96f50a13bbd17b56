//! PostgreSQL backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{OrderRepository, ProductCatalog, SessionResolver, StoreResult, UserCartRepository};
use crate::domain::aggregates::{Address, CartItem, Order, OrderLine, Product};
use crate::domain::value_objects::{CartItemId, OrderId, ProductId, Quantity, UserId};
use crate::error::StoreError;

const CART_COLUMNS: &str = "id, user_id, product_id, quantity, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
    pub fn pool(&self) -> &PgPool { &self.pool }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow { id: Uuid, name: String, price_regular: Decimal, price_offer: Option<Decimal>, stock: i32, images: Vec<String> }

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id.into(), name: r.name, price_regular: r.price_regular, price_offer: r.price_offer,
            stock: u32::try_from(r.stock).unwrap_or(0), images: r.images,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartRow { id: Uuid, user_id: Uuid, product_id: Uuid, quantity: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

impl TryFrom<CartRow> for CartItem {
    type Error = StoreError;
    fn try_from(r: CartRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(i64::from(r.quantity))
            .map_err(|e| StoreError::InvalidRow(format!("user_carts {}: {e}", r.id)))?;
        Ok(CartItem {
            id: CartItemId::from_uuid(r.id), user_id: r.user_id.into(), product_id: r.product_id.into(),
            quantity, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    cart: CartRow,
    name: String,
    price_regular: Decimal,
    price_offer: Option<Decimal>,
    stock: i32,
    images: Vec<String>,
}

#[async_trait]
impl ProductCatalog for PgStore {
    #[instrument(skip(self))]
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, price_regular, price_offer, stock, images FROM products WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query_as::<_, ProductRow>("SELECT id, name, price_regular, price_offer, stock, images FROM products WHERE id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}

#[async_trait]
impl UserCartRepository for PgStore {
    #[instrument(skip(self))]
    async fn lines(&self, user: UserId) -> StoreResult<Vec<(CartItem, Product)>> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT c.id, c.user_id, c.product_id, c.quantity, c.created_at, c.updated_at, \
                    p.name, p.price_regular, p.price_offer, p.stock, p.images \
             FROM user_carts c JOIN products p ON p.id = c.product_id \
             WHERE c.user_id = $1 ORDER BY c.created_at, c.id",
        )
        .bind(user).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| {
                let product = Product::from(ProductRow {
                    id: r.cart.product_id, name: r.name, price_regular: r.price_regular,
                    price_offer: r.price_offer, stock: r.stock, images: r.images,
                });
                Ok((CartItem::try_from(r.cart)?, product))
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn add(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<CartItem> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO user_carts (id, user_id, product_id, quantity, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (user_id, product_id) DO UPDATE \
             SET quantity = user_carts.quantity + EXCLUDED.quantity, updated_at = NOW() \
             WHERE user_carts.quantity <= 2147483647 - EXCLUDED.quantity \
             RETURNING {CART_COLUMNS}"
        ))
        .bind(Uuid::now_v7()).bind(user).bind(product).bind(i32::from(quantity))
        .fetch_optional(&self.pool).await?;
        // No row back means the conflict guard refused the sum
        row.ok_or(StoreError::QuantityOverflow(product)).and_then(CartItem::try_from)
    }

    #[instrument(skip(self))]
    async fn set_quantity(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "UPDATE user_carts SET quantity = $3, updated_at = NOW() \
             WHERE user_id = $1 AND product_id = $2 RETURNING {CART_COLUMNS}"
        ))
        .bind(user).bind(product).bind(i32::from(quantity))
        .fetch_optional(&self.pool).await?;
        row.map(CartItem::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn remove(&self, user: UserId, product: ProductId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM user_carts WHERE user_id = $1 AND product_id = $2")
            .bind(user).bind(product).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn clear(&self, user: UserId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM user_carts WHERE user_id = $1").bind(user).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, ordered), fields(lines = ordered.len()))]
    async fn remove_ordered(&self, user: UserId, ordered: &[(ProductId, Quantity)]) -> StoreResult<u64> {
        let products: Vec<Uuid> = ordered.iter().map(|(p, _)| p.as_uuid()).collect();
        let quantities: Vec<i32> = ordered.iter().map(|(_, q)| i32::from(*q)).collect();
        let mut tx = self.pool.begin().await?;
        // Delete first so a row reduced below the ordered quantity is not deleted too
        let deleted = sqlx::query(
            "DELETE FROM user_carts c \
             USING UNNEST($2::uuid[], $3::int4[]) AS o(product_id, quantity) \
             WHERE c.user_id = $1 AND c.product_id = o.product_id AND c.quantity <= o.quantity",
        )
        .bind(user).bind(&products).bind(&quantities)
        .execute(&mut *tx).await?;
        let reduced = sqlx::query(
            "UPDATE user_carts c SET quantity = c.quantity - o.quantity, updated_at = NOW() \
             FROM UNNEST($2::uuid[], $3::int4[]) AS o(product_id, quantity) \
             WHERE c.user_id = $1 AND c.product_id = o.product_id AND c.quantity > o.quantity",
        )
        .bind(user).bind(&products).bind(&quantities)
        .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(reduced.rows_affected() + deleted.rows_affected())
    }

    #[instrument(skip(self))]
    async fn count(&self, user: UserId) -> StoreResult<u32> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM user_carts WHERE user_id = $1")
            .bind(user).fetch_one(&self.pool).await?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Option<Uuid>, cart_items: Json<Vec<OrderLine>>, total: Decimal, payment_method: String,
    billing_name: String, billing_phone: String, billing_email: Option<String>, billing_address: String,
    billing_city: String, billing_district: String, billing_country: String, billing_postal_code: Option<String>,
    shipping_name: String, shipping_phone: String, shipping_email: Option<String>, shipping_address: String,
    shipping_city: String, shipping_district: String, shipping_country: String, shipping_postal_code: Option<String>,
    notes: String, status: String, payment_status: String, created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let invalid = |e: &dyn std::fmt::Display| StoreError::InvalidRow(format!("user_orders {}: {e}", r.id));
        Ok(Order {
            id: OrderId::from_uuid(r.id),
            user_id: r.user_id.map(UserId::from),
            cart_items: r.cart_items.0,
            total: r.total,
            payment_method: r.payment_method.parse().map_err(|e| invalid(&e))?,
            billing: Address {
                name: r.billing_name, phone: r.billing_phone, email: r.billing_email, address: r.billing_address,
                city: r.billing_city, district: r.billing_district, country: r.billing_country, postal_code: r.billing_postal_code,
            },
            shipping: Address {
                name: r.shipping_name, phone: r.shipping_phone, email: r.shipping_email, address: r.shipping_address,
                city: r.shipping_city, district: r.shipping_district, country: r.shipping_country, postal_code: r.shipping_postal_code,
            },
            notes: r.notes,
            status: r.status.parse().map_err(|e| invalid(&e))?,
            payment_status: r.payment_status.parse().map_err(|e| invalid(&e))?,
            created_at: r.created_at,
        })
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let (b, s) = (order.billing(), order.shipping());
        sqlx::query(
            "INSERT INTO user_orders (id, user_id, cart_items, total, payment_method, \
               billing_name, billing_phone, billing_email, billing_address, billing_city, billing_district, billing_country, billing_postal_code, \
               shipping_name, shipping_phone, shipping_email, shipping_address, shipping_city, shipping_district, shipping_country, shipping_postal_code, \
               notes, status, payment_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
        )
        .bind(order.id()).bind(order.user_id()).bind(Json(order.cart_items())).bind(order.total()).bind(order.payment_method().as_str())
        .bind(&b.name).bind(&b.phone).bind(&b.email).bind(&b.address).bind(&b.city).bind(&b.district).bind(&b.country).bind(&b.postal_code)
        .bind(&s.name).bind(&s.phone).bind(&s.email).bind(&s.address).bind(&s.city).bind(&s.district).bind(&s.country).bind(&s.postal_code)
        .bind(order.notes()).bind(order.status().as_str()).bind(order.payment_status().as_str()).bind(order.created_at())
        .execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM user_orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn save_status(&self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query("UPDATE user_orders SET status = $2, payment_status = $3 WHERE id = $1")
            .bind(order.id()).bind(order.status().as_str()).bind(order.payment_status().as_str())
            .execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidRow(format!("order {} not found", order.id())));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionResolver for PgStore {
    #[instrument(skip_all)]
    async fn current_user(&self, token: &str) -> StoreResult<Option<UserId>> {
        let user: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM auth_sessions WHERE token = $1 AND expires_at > NOW()")
            .bind(token).fetch_optional(&self.pool).await?;
        Ok(user.map(UserId::from))
    }
}
