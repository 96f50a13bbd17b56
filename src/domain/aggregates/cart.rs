//! Cart Aggregate
//!
//! Persisted user rows, client-held guest lines, and the derived summary
//! that is rebuilt on every read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::product::Product;
use crate::domain::pricing::{line_total, resolve_price, PriceFields, Priced};
use crate::domain::value_objects::{CartItemId, ProductId, Quantity, UserId};

/// Server-persisted cart row. Unique per `(user_id, product_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display fields captured when a guest adds a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Decimal,
}

impl From<&Product> for ProductSnapshot {
    fn from(p: &Product) -> Self {
        Self { name: p.name.clone(), image: p.primary_image().map(String::from), price: p.effective_price() }
    }
}

/// Client-held cart line. No server identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuestCartItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub product: ProductSnapshot,
}

impl Priced for GuestCartItem {
    fn price_fields(&self) -> PriceFields { PriceFields::plain(self.product.price) }
}

/// One line of the active cart, whichever mode produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CartEntry {
    User { item: CartItem, product: Product },
    Guest(GuestCartItem),
}

impl CartEntry {
    pub fn product_id(&self) -> ProductId {
        match self {
            Self::User { item, .. } => item.product_id,
            Self::Guest(g) => g.product_id,
        }
    }

    pub fn quantity(&self) -> Quantity {
        match self {
            Self::User { item, .. } => item.quantity,
            Self::Guest(g) => g.quantity,
        }
    }

    pub fn unit_price(&self) -> Decimal { resolve_price(self) }
    pub fn line_total(&self) -> Decimal { line_total(self, self.quantity().value()) }
}

impl Priced for CartEntry {
    fn price_fields(&self) -> PriceFields {
        match self {
            Self::User { product, .. } => product.price_fields(),
            Self::Guest(g) => g.price_fields(),
        }
    }
}

/// Derived cart shape. Never stored; rebuilt from lines on each read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartSummary {
    pub items: Vec<CartEntry>,
    pub total_items: u32,
    pub total_price: Decimal,
    pub item_count: usize,
}

impl CartSummary {
    pub fn from_entries(items: Vec<CartEntry>) -> Self {
        let total_items = items.iter().fold(0u32, |acc, e| acc.saturating_add(e.quantity().value()));
        let total_price = items.iter().map(CartEntry::line_total).sum();
        let item_count = items.len();
        Self { items, total_items, total_price, item_count }
    }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}
