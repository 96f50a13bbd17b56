//! Storage contracts consumed by the engine.
//!
//! The relational store and the auth service are external collaborators;
//! the engine only talks to them through these traits. [`postgres`] backs
//! them with sqlx, [`memory`] keeps everything in process for tests and
//! local runs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::aggregates::{CartItem, Order, Product};
use crate::domain::value_objects::{OrderId, ProductId, Quantity, UserId};
use crate::error::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Products for the given ids. Unknown ids are skipped.
    async fn products(&self, ids: &[ProductId]) -> StoreResult<Vec<Product>>;
}

/// Server-side cart rows, unique per `(user, product)`.
#[async_trait]
pub trait UserCartRepository: Send + Sync {
    /// Rows joined with their live product, oldest first. Rows whose
    /// product no longer exists are left out.
    async fn lines(&self, user: UserId) -> StoreResult<Vec<(CartItem, Product)>>;

    /// Upsert: inserts the row or adds `quantity` to the existing one.
    async fn add(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<CartItem>;

    /// Overwrites the quantity. `None` when the user has no row for the product.
    async fn set_quantity(&self, user: UserId, product: ProductId, quantity: Quantity) -> StoreResult<Option<CartItem>>;

    async fn remove(&self, user: UserId, product: ProductId) -> StoreResult<bool>;

    async fn clear(&self, user: UserId) -> StoreResult<u64>;

    /// Takes ordered quantities off the user's rows: a row that grew past the
    /// ordered quantity keeps the difference, the rest are deleted. Rows for
    /// other products are untouched. Returns how many rows were changed.
    async fn remove_ordered(&self, user: UserId, ordered: &[(ProductId, Quantity)]) -> StoreResult<u64>;

    /// Sum of quantities in a single round-trip.
    async fn count(&self, user: UserId) -> StoreResult<u32>;
}

/// Append-only order storage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    async fn get(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Persists `status` and `payment_status` only.
    async fn save_status(&self, order: &Order) -> StoreResult<()>;
}

/// "Current user" lookup offered by the auth service.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn current_user(&self, token: &str) -> StoreResult<Option<UserId>>;
}

/// Handles to every collaborator, shared across requests.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn ProductCatalog>,
    pub carts: Arc<dyn UserCartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub sessions: Arc<dyn SessionResolver>,
}

impl Stores {
    /// All four contracts served by one backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProductCatalog + UserCartRepository + OrderRepository + SessionResolver + 'static,
    {
        Self { catalog: backend.clone(), carts: backend.clone(), orders: backend.clone(), sessions: backend }
    }
}
