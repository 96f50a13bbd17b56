//! Client-held guest cart.
//!
//! Everything here is synchronous and only fails on invalid input.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{CartEntry, CartSummary, GuestCartItem, Product, ProductSnapshot};
use crate::domain::value_objects::{ProductId, Quantity};
use crate::error::{CartError, Result};

/// Anonymous cart. At most one line per product.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GuestCartWire")]
pub struct GuestCart {
    items: Vec<GuestCartItem>,
}

/// Whatever the client sent back; duplicate lines are folded on load.
#[derive(Deserialize)]
struct GuestCartWire {
    #[serde(default)]
    items: Vec<GuestCartItem>,
}

impl TryFrom<GuestCartWire> for GuestCart {
    type Error = CartError;
    fn try_from(wire: GuestCartWire) -> Result<Self> {
        let mut cart = GuestCart::default();
        for item in wire.items {
            cart.upsert(item)?;
        }
        Ok(cart)
    }
}

impl GuestCart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[GuestCartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    fn position(&self, product: ProductId) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product)
    }

    fn upsert(&mut self, item: GuestCartItem) -> Result<()> {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = existing.quantity.checked_add(item.quantity)?;
        } else {
            self.items.push(item);
        }
        Ok(())
    }

    /// Adds `quantity` of `product`, summing with an existing line. The
    /// display snapshot is taken from the product as it is now.
    pub fn add_item(&mut self, product: &Product, quantity: Quantity) -> Result<()> {
        let snapshot = ProductSnapshot::from(product);
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            existing.quantity = existing.quantity.checked_add(quantity)?;
            existing.product = snapshot;
        } else {
            self.items.push(GuestCartItem { product_id: product.id, quantity, product: snapshot });
        }
        Ok(())
    }

    /// Sets the quantity; anything `<= 0` removes the line.
    pub fn update_quantity(&mut self, product: ProductId, quantity: i64) -> Result<()> {
        let idx = self.position(product).ok_or(CartError::ItemNotFound(product))?;
        if quantity <= 0 {
            self.items.remove(idx);
            return Ok(());
        }
        let quantity = Quantity::new(quantity)?;
        if let Some(item) = self.items.get_mut(idx) {
            item.quantity = quantity;
        }
        Ok(())
    }

    /// Removes the line if present.
    pub fn remove_item(&mut self, product: ProductId) -> Option<GuestCartItem> {
        self.position(product).map(|idx| self.items.remove(idx))
    }

    pub fn clear(&mut self) { self.items.clear(); }

    /// Takes ordered quantities off their lines, dropping lines that reach zero.
    pub fn remove_ordered(&mut self, ordered: &[(ProductId, Quantity)]) {
        for (product, quantity) in ordered {
            let Some(idx) = self.position(*product) else { continue };
            match self.items[idx].quantity.checked_sub(*quantity) {
                Some(left) => self.items[idx].quantity = left,
                None => {
                    self.items.remove(idx);
                }
            }
        }
    }

    pub fn entries(&self) -> Vec<CartEntry> { self.items.iter().cloned().map(CartEntry::Guest).collect() }

    pub fn summary(&self) -> CartSummary { CartSummary::from_entries(self.entries()) }

    pub fn count(&self) -> u32 {
        self.items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(regular: i64, offer: Option<i64>) -> Product {
        let p = Product::new(ProductId::new(), "Mango", Decimal::new(regular, 0), 10);
        match offer { Some(o) => p.with_offer(Decimal::new(o, 0)), None => p }
    }

    #[test]
    fn test_offer_price_and_readd_sums() {
        let a = product(100, Some(80));
        let mut cart = GuestCart::new();
        cart.add_item(&a, Quantity::new(2).unwrap()).unwrap();
        assert_eq!(cart.summary().total_price, Decimal::new(160, 0));

        cart.add_item(&a, Quantity::ONE).unwrap();
        let summary = cart.summary();
        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_price, Decimal::new(240, 0));
    }

    #[test]
    fn test_update_to_zero_removes() {
        let a = product(10, None);
        let mut cart = GuestCart::new();
        cart.add_item(&a, Quantity::new(2).unwrap()).unwrap();
        cart.update_quantity(a.id, 5).unwrap();
        assert_eq!(cart.count(), 5);
        cart.update_quantity(a.id, 0).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(cart.update_quantity(a.id, 1), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn test_remove_and_count() {
        let (a, b) = (product(10, None), product(20, None));
        let mut cart = GuestCart::new();
        cart.add_item(&a, Quantity::new(2).unwrap()).unwrap();
        cart.add_item(&b, Quantity::new(3).unwrap()).unwrap();
        assert_eq!(cart.count(), 5);
        assert!(cart.remove_item(a.id).is_some());
        assert!(cart.remove_item(a.id).is_none());
        assert_eq!(cart.summary().total_price, Decimal::new(60, 0));
    }

    #[test]
    fn test_wire_duplicates_are_folded() {
        let id = ProductId::new();
        let json = serde_json::json!({
            "items": [
                {"product_id": id, "quantity": 1, "product": {"name": "Tea", "price": "5"}},
                {"product_id": id, "quantity": 2, "product": {"name": "Tea", "price": "5"}}
            ]
        });
        let cart: GuestCart = serde_json::from_value(json).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.count(), 3);
        assert_eq!(cart.summary().total_price, Decimal::new(15, 0));
    }

    #[test]
    fn test_remove_ordered_keeps_extra_quantity() {
        let (a, b) = (product(10, None), product(20, None));
        let mut cart = GuestCart::new();
        cart.add_item(&a, Quantity::new(3).unwrap()).unwrap();
        cart.add_item(&b, Quantity::ONE).unwrap();
        cart.remove_ordered(&[(a.id, Quantity::ONE), (b.id, Quantity::ONE), (ProductId::new(), Quantity::ONE)]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product_id, a.id);
        assert_eq!(cart.count(), 2);
    }

    #[test]
    fn test_overflowing_add_is_rejected() {
        let a = product(10, None);
        let mut cart = GuestCart::new();
        cart.add_item(&a, Quantity::MAX).unwrap();
        let err = cart.add_item(&a, Quantity::ONE).unwrap_err();
        assert_eq!(err.field(), Some("quantity"));
        assert_eq!(cart.items()[0].quantity, Quantity::MAX);
    }
}
