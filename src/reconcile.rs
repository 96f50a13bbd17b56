//! Guest → user cart reconciliation on login.
//!
//! Each guest line is upserted into the user cart (quantities sum, never
//! overwrite). A line leaves the guest cart only once the server confirmed
//! it; a line that fails stays for the next attempt while the lines after it
//! are still merged. Lines whose product left the catalog are dropped and
//! reported.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cart::CartStore;
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{ProductId, UserId};
use crate::error::{CartError, Result};
use crate::messaging::{publish_best_effort, EventPublisher};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub user_id: UserId,
    pub merged: Vec<ProductId>,
    /// Guest lines for products no longer in the catalog.
    pub dropped: Vec<ProductId>,
}

#[derive(Clone)]
pub struct Reconciler {
    events: Arc<dyn EventPublisher>,
}

impl Reconciler {
    pub fn new(events: Arc<dyn EventPublisher>) -> Self { Self { events } }

    /// Merges the guest cart into the user cart. On failure the returned
    /// `MergeConflict` names the first line that failed; every failed line
    /// is still in the guest cart.
    #[instrument(skip_all)]
    pub async fn reconcile(&self, store: &mut CartStore) -> Result<MergeReport> {
        let target = store.user_cart().cloned().ok_or(CartError::Unauthenticated)?;
        let user_id = target.user();
        let pending = store.guest().items().to_vec();

        let ids: Vec<_> = pending.iter().map(|i| i.product_id).collect();
        let listed: HashSet<ProductId> = store.catalog().products(&ids).await?.into_iter().map(|p| p.id).collect();

        let mut merged = Vec::with_capacity(pending.len());
        let mut dropped = Vec::new();
        let mut failure = None;

        for item in pending {
            if !listed.contains(&item.product_id) {
                store.guest_mut().remove_item(item.product_id);
                dropped.push(item.product_id);
                continue;
            }
            match target.upsert(item.product_id, item.quantity).await {
                Ok(_) => {
                    store.guest_mut().remove_item(item.product_id);
                    merged.push(item.product_id);
                }
                Err(e) => {
                    warn!(user = %user_id, product = %item.product_id, error = %e, "guest line not merged, kept for retry");
                    failure.get_or_insert(CartError::MergeConflict { product_id: item.product_id, reason: e.to_string() });
                }
            }
        }

        if !dropped.is_empty() {
            info!(user = %user_id, lines = dropped.len(), "guest lines for delisted products dropped");
        }
        if !merged.is_empty() {
            let event = DomainEvent::Cart(CartEvent::GuestCartMerged { user_id, merged_lines: merged.clone() });
            publish_best_effort(self.events.as_ref(), &event).await;
        }

        if let Some(err) = failure {
            return Err(err);
        }

        store.guest_mut().clear();
        info!(user = %user_id, lines = merged.len(), "guest cart merged");
        Ok(MergeReport { user_id, merged, dropped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{GuestCart, Session};
    use crate::domain::aggregates::Product;
    use crate::messaging::RecordingPublisher;
    use crate::store::{MemoryStore, Stores, UserCartRepository};
    use rust_decimal::Decimal;

    async fn seeded(n: usize) -> (Arc<MemoryStore>, Stores, Vec<Product>) {
        let backend = Arc::new(MemoryStore::new());
        let mut products = vec![];
        for i in 0..n {
            let p = Product::new(ProductId::new(), format!("P{i}"), Decimal::new(10 * (i as i64 + 1), 0), 100);
            backend.insert_product(p.clone()).await;
            products.push(p);
        }
        (backend.clone(), Stores::from_backend(backend), products)
    }

    #[tokio::test]
    async fn test_merge_into_empty_user_cart() {
        let (backend, stores, products) = seeded(3).await;
        let events = Arc::new(RecordingPublisher::default());
        let reconciler = Reconciler::new(events.clone());
        let mut store = CartStore::new(Session::guest(), GuestCart::new(), &stores);
        for (i, p) in products.iter().enumerate() {
            store.add_item(p.id, i as i64 + 1).await.unwrap();
        }

        let user = UserId::new();
        let report = store.login(user, &reconciler).await.unwrap();
        assert_eq!(report.merged.len(), 3);
        assert!(store.guest().is_empty());

        let rows = backend.cart_rows(user).await;
        assert_eq!(rows.len(), 3);
        for (i, p) in products.iter().enumerate() {
            let row = rows.iter().find(|r| r.product_id == p.id).unwrap();
            assert_eq!(row.quantity.value() as usize, i + 1);
        }
        assert_eq!(events.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_products_sum() {
        let (_, stores, products) = seeded(1).await;
        let user = UserId::new();
        let mut existing = CartStore::new(Session::user(user), GuestCart::new(), &stores);
        existing.add_item(products[0].id, 2).await.unwrap();

        let mut store = CartStore::new(Session::guest(), GuestCart::new(), &stores);
        store.add_item(products[0].id, 1).await.unwrap();
        store.login(user, &Reconciler::new(Arc::new(RecordingPublisher::default()))).await.unwrap();

        let summary = store.get_summary().await.unwrap();
        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.total_items, 3);
        assert!(store.guest().is_empty());
    }

    #[tokio::test]
    async fn test_failed_line_does_not_block_later_lines() {
        let (backend, stores, products) = seeded(3).await;
        let mut store = CartStore::new(Session::guest(), GuestCart::new(), &stores);
        for p in &products {
            store.add_item(p.id, 1).await.unwrap();
        }
        backend.set_fail_on_add_for(Some(products[1].id)).await;

        let user = UserId::new();
        let reconciler = Reconciler::new(Arc::new(RecordingPublisher::default()));
        let err = store.login(user, &reconciler).await.unwrap_err();
        assert!(matches!(err, CartError::MergeConflict { product_id, .. } if product_id == products[1].id));
        let left: Vec<_> = store.guest().items().iter().map(|i| i.product_id).collect();
        assert_eq!(left, vec![products[1].id]);
        assert_eq!(backend.cart_rows(user).await.len(), 2);
        assert_eq!(store.mode(), crate::cart::CartMode::User(user));

        backend.set_fail_on_add_for(None).await;
        let report = store.login(user, &reconciler).await.unwrap();
        assert_eq!(report.merged, vec![products[1].id]);
        assert!(store.guest().is_empty());
        assert_eq!(backend.count(user).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delisted_product_is_dropped_and_reported() {
        let (backend, stores, products) = seeded(2).await;
        let gone = ProductId::new();
        let guest: GuestCart = serde_json::from_value(serde_json::json!({
            "items": [
                {"product_id": products[0].id, "quantity": 1, "product": {"name": "P0", "price": "10"}},
                {"product_id": gone, "quantity": 2, "product": {"name": "Retired", "price": "99"}},
                {"product_id": products[1].id, "quantity": 3, "product": {"name": "P1", "price": "20"}}
            ]
        }))
        .unwrap();
        let mut store = CartStore::new(Session::guest(), guest, &stores);

        let user = UserId::new();
        let report = store.login(user, &Reconciler::new(Arc::new(RecordingPublisher::default()))).await.unwrap();
        assert_eq!(report.dropped, vec![gone]);
        assert_eq!(report.merged, vec![products[0].id, products[1].id]);
        assert!(store.guest().is_empty());

        let summary = store.get_summary().await.unwrap();
        assert_eq!(store.get_count().await.unwrap(), summary.total_items);
        assert_eq!(summary.total_items, 4);
        assert_eq!(backend.cart_rows(user).await.len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_outage_leaves_guest_cart_alone() {
        let (backend, stores, products) = seeded(1).await;
        let mut store = CartStore::new(Session::guest(), GuestCart::new(), &stores);
        store.add_item(products[0].id, 2).await.unwrap();
        backend.set_fail_catalog(true).await;

        let user = UserId::new();
        let err = store.login(user, &Reconciler::new(Arc::new(RecordingPublisher::default()))).await.unwrap_err();
        assert!(matches!(err, CartError::Persistence(_)));
        assert_eq!(store.guest().count(), 2);
        assert!(backend.cart_rows(user).await.is_empty());
    }

    #[tokio::test]
    async fn test_requires_user_mode() {
        let (_, stores, _) = seeded(0).await;
        let mut store = CartStore::new(Session::guest(), GuestCart::new(), &stores);
        let reconciler = Reconciler::new(Arc::new(RecordingPublisher::default()));
        assert!(matches!(reconciler.reconcile(&mut store).await, Err(CartError::Unauthenticated)));
    }
}
