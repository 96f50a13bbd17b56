//! Product Aggregate (read-only to the checkout engine)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pricing::{resolve_price, PriceFields, Priced};
use crate::domain::value_objects::{ProductId, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price_regular: Decimal,
    #[serde(default)]
    pub price_offer: Option<Decimal>,
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price_regular: Decimal, stock: u32) -> Self {
        Self { id, name: name.into(), price_regular, price_offer: None, stock, images: vec![] }
    }

    pub fn with_offer(mut self, offer: Decimal) -> Self { self.price_offer = Some(offer); self }
    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.images.push(url.into()); self }

    pub fn effective_price(&self) -> Decimal { resolve_price(self) }
    pub fn primary_image(&self) -> Option<&str> { self.images.first().map(String::as_str) }
    pub fn has_stock_for(&self, qty: Quantity) -> bool { qty.value() <= self.stock }
}

impl Priced for Product {
    fn price_fields(&self) -> PriceFields {
        PriceFields::with_offer(self.price_regular, self.price_offer)
    }
}
