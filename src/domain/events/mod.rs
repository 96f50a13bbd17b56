//! Domain events
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::PaymentMethod;
use crate::domain::value_objects::{OrderId, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    GuestCartMerged { user_id: UserId, merged_lines: Vec<ProductId> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: Option<UserId>, total: Decimal, payment_method: PaymentMethod },
}

impl DomainEvent {
    /// Messaging subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Cart(CartEvent::GuestCartMerged { .. }) => "checkout.cart.merged",
            Self::Order(OrderEvent::Placed { .. }) => "checkout.order.placed",
        }
    }
}
