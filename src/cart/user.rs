//! Server-persisted user cart.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::aggregates::{CartEntry, CartItem, Product};
use crate::domain::value_objects::{ProductId, Quantity, UserId};
use crate::error::{CartError, Result, StoreError};
use crate::store::UserCartRepository;

/// Thin handle over the user's rows. Holds no item state of its own, so
/// what it reports is always what the server confirmed.
#[derive(Clone)]
pub struct UserCart {
    user: UserId,
    repo: Arc<dyn UserCartRepository>,
}

impl UserCart {
    pub fn new(user: UserId, repo: Arc<dyn UserCartRepository>) -> Self { Self { user, repo } }

    pub fn user(&self) -> UserId { self.user }

    /// Upsert by `(user, product)`; shared by add-to-cart and guest merges.
    #[instrument(skip(self), fields(user = %self.user))]
    pub async fn upsert(&self, product: ProductId, quantity: Quantity) -> Result<CartItem> {
        let row = match self.repo.add(self.user, product, quantity).await {
            Err(StoreError::QuantityOverflow(_)) => return Err(CartError::validation("quantity", "quantity is too large")),
            other => other?,
        };
        debug!(quantity = %row.quantity, "cart row upserted");
        Ok(row)
    }

    pub async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<()> {
        self.upsert(product.id, quantity).await.map(|_| ())
    }

    /// Sets the quantity; anything `<= 0` removes the line. A product with
    /// no line is `ItemNotFound` either way.
    #[instrument(skip(self), fields(user = %self.user))]
    pub async fn update_quantity(&self, product: ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return match self.repo.remove(self.user, product).await? {
                true => Ok(()),
                false => Err(CartError::ItemNotFound(product)),
            };
        }
        let quantity = Quantity::new(quantity)?;
        self.repo
            .set_quantity(self.user, product, quantity)
            .await?
            .map(|_| ())
            .ok_or(CartError::ItemNotFound(product))
    }

    #[instrument(skip(self), fields(user = %self.user))]
    pub async fn remove_item(&self, product: ProductId) -> Result<()> {
        if !self.repo.remove(self.user, product).await? {
            debug!("remove on a line that was not in the cart");
        }
        Ok(())
    }

    pub async fn entries(&self) -> Result<Vec<CartEntry>> {
        let lines = self.repo.lines(self.user).await?;
        Ok(lines.into_iter().map(|(item, product)| CartEntry::User { item, product }).collect())
    }

    pub async fn count(&self) -> Result<u32> { Ok(self.repo.count(self.user).await?) }

    #[instrument(skip(self, ordered), fields(user = %self.user))]
    pub async fn remove_ordered(&self, ordered: &[(ProductId, Quantity)]) -> Result<()> {
        let changed = self.repo.remove_ordered(self.user, ordered).await?;
        debug!(changed, "ordered lines taken off the user cart");
        Ok(())
    }

    #[instrument(skip(self), fields(user = %self.user))]
    pub async fn clear(&self) -> Result<()> {
        let removed = self.repo.clear(self.user).await?;
        debug!(removed, "user cart cleared");
        Ok(())
    }
}
