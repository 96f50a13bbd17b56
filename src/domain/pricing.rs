//! Effective unit price resolution.
//!
//! Every price shown to a shopper and every total charged at checkout goes
//! through [`resolve_price`]. Precedence:
//!
//! 1. `price_offer`, when present and non-zero
//! 2. `price_regular`, when present
//! 3. plain `price` (guest cart snapshot shape)
//! 4. zero
//!
//! An offer of exactly zero means "no active offer", never "free".

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The price-bearing fields of a product-like value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFields {
    #[serde(default)]
    pub price_offer: Option<Decimal>,
    #[serde(default)]
    pub price_regular: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl PriceFields {
    pub fn regular(price_regular: Decimal) -> Self {
        Self { price_regular: Some(price_regular), ..Self::default() }
    }

    pub fn with_offer(price_regular: Decimal, price_offer: Option<Decimal>) -> Self {
        Self { price_offer, price_regular: Some(price_regular), price: None }
    }

    pub fn plain(price: Decimal) -> Self {
        Self { price: Some(price), ..Self::default() }
    }
}

/// Anything that can be priced by [`resolve_price`].
pub trait Priced {
    fn price_fields(&self) -> PriceFields;
}

impl Priced for PriceFields {
    fn price_fields(&self) -> PriceFields { *self }
}

impl<T: Priced + ?Sized> Priced for &T {
    fn price_fields(&self) -> PriceFields { (**self).price_fields() }
}

/// Loose JSON records (e.g. the product blob frozen on an order line).
/// Numbers and numeric strings are both accepted; anything else is ignored.
impl Priced for serde_json::Value {
    fn price_fields(&self) -> PriceFields {
        let field = |key: &str| match self.get(key)? {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        PriceFields {
            price_offer: field("price_offer"),
            price_regular: field("price_regular"),
            price: field("price"),
        }
    }
}

/// Resolve the single effective unit price. Total and side-effect free;
/// never negative.
pub fn resolve_price<P: Priced + ?Sized>(item: &P) -> Decimal {
    let fields = item.price_fields();
    let resolved = match fields {
        PriceFields { price_offer: Some(offer), .. } if !offer.is_zero() => offer,
        PriceFields { price_regular: Some(regular), .. } => regular,
        PriceFields { price: Some(plain), .. } => plain,
        _ => Decimal::ZERO,
    };
    resolved.max(Decimal::ZERO)
}

/// `quantity × resolve_price(item)`.
pub fn line_total<P: Priced + ?Sized>(item: &P, quantity: u32) -> Decimal {
    resolve_price(item) * Decimal::from(quantity)
}
