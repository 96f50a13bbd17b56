//! Checkout assembler.
//!
//! Turns the active cart plus the checkout form into a write-once [`Order`].
//! Prices are re-resolved from the live catalog at submission; nothing is
//! read from an earlier summary. Order creation and cart clearing are two
//! separate steps: once the order row exists it is authoritative, and a
//! failed clear is only logged. Clearing takes off only what was ordered, so
//! lines another device added meanwhile stay in the cart.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::cart::CartStore;
use crate::domain::aggregates::{Address, Order, OrderError, OrderLine, PaymentMethod};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::error::{CartError, Result, StoreError};
use crate::messaging::{publish_best_effort, EventPublisher};
use crate::store::{OrderRepository, ProductCatalog};

/// Submitted checkout form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub billing: Address,
    #[serde(default)]
    pub shipping: Option<Address>,
    #[serde(default)]
    pub same_as_billing: bool,
    pub payment_method: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Clone)]
pub struct CheckoutAssembler {
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventPublisher>,
}

impl CheckoutAssembler {
    pub fn new(catalog: Arc<dyn ProductCatalog>, orders: Arc<dyn OrderRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { catalog, orders, events }
    }

    #[instrument(skip_all, fields(mode = ?cart.mode()))]
    pub async fn submit_order(&self, cart: &mut CartStore, request: CheckoutRequest) -> Result<Order> {
        let entries = cart.entries().await?;
        if entries.is_empty() {
            return Err(CartError::validation("cart", "cart is empty"));
        }

        let billing = request.billing.validated("billing")?;
        let shipping = if request.same_as_billing {
            billing.clone()
        } else {
            request.shipping.unwrap_or_default().validated("shipping")?
        };
        let payment_method: PaymentMethod = request.payment_method.parse()?;

        let ids: Vec<_> = entries.iter().map(|e| e.product_id()).collect();
        let live: HashMap<_, _> = self.catalog.products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();

        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            let product_id = entry.product_id();
            let quantity = entry.quantity();
            let product = live.get(&product_id).ok_or(CartError::ProductNotFound(product_id))?;
            if !product.has_stock_for(quantity) {
                return Err(CartError::Stock { product_id, requested: quantity.value(), available: product.stock });
            }
            let line = OrderLine::snapshot(product_id, quantity.value(), product).map_err(StoreError::from)?;
            lines.push(line);
        }

        let user_id = cart.user_id();
        let order = Order::place(user_id, lines, payment_method, billing, shipping, request.notes.trim())
            .map_err(|e| match e {
                OrderError::NoItems => CartError::validation("cart", "cart is empty"),
                other => CartError::validation("order", other.to_string()),
            })?;

        self.orders.insert(&order).await?;
        info!(order_id = %order.id(), total = %order.total(), payment_method = %payment_method, "order placed");

        let event = DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id(), user_id, total: order.total(), payment_method,
        });
        publish_best_effort(self.events.as_ref(), &event).await;

        let ordered: Vec<_> = entries.iter().map(|e| (e.product_id(), e.quantity())).collect();
        if let Err(e) = cart.remove_ordered(&ordered).await {
            warn!(order_id = %order.id(), error = %e, "order placed but cart could not be cleared");
        }
        Ok(order)
    }
}
