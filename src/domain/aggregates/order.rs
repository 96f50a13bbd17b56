//! Order Aggregate
//!
//! Write-once snapshot of a cart at submission time. Only `status` and
//! `payment_status` change after creation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

use crate::domain::pricing::{resolve_price, Priced};
use crate::domain::value_objects::{OrderId, ProductId, UserId};
use crate::error::CartError;

/// Frozen order line. `product` is the catalog record as it was at checkout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
    pub product: serde_json::Value,
}

impl OrderLine {
    /// Prices the line through the resolver, never from a cached total.
    pub fn snapshot<P: Priced + Serialize>(product_id: ProductId, quantity: u32, product: &P) -> Result<Self, serde_json::Error> {
        Ok(Self { product_id, quantity, price: resolve_price(product), product: serde_json::to_value(product)? })
    }

    pub fn total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Address {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "is required"))]
    pub phone: String,
    #[validate(email(message = "is not a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "is required"))]
    pub district: String,
    #[validate(length(min = 1, message = "is required"))]
    pub country: String,
    #[validate(required(message = "is required"))]
    pub postal_code: Option<String>,
}

const ADDRESS_FIELDS: [&str; 8] = ["name", "phone", "email", "address", "city", "district", "country", "postal_code"];

impl Address {
    /// Trims every field; blank optionals become `None`.
    pub fn normalized(&self) -> Self {
        let opt = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: opt(&self.email),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            district: self.district.trim().to_string(),
            country: self.country.trim().to_string(),
            postal_code: opt(&self.postal_code),
        }
    }

    /// Validates the required-field rule. The error names the first failing
    /// field as `<block>.<field>`, e.g. `billing.phone`.
    pub fn validated(&self, block: &str) -> Result<Self, CartError> {
        let address = self.normalized();
        if let Err(errors) = address.validate() {
            let field_errors = errors.field_errors();
            for field in ADDRESS_FIELDS {
                if let Some(first) = field_errors.get(field).and_then(|errs| errs.first()) {
                    let message = first.message.as_deref().unwrap_or("is invalid").to_string();
                    return Err(CartError::validation(format!("{block}.{field}"), message));
                }
            }
            return Err(CartError::validation(block, "is invalid"));
        }
        Ok(address)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { Bkash, Nagad, Bank }

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Bkash => "bkash", Self::Nagad => "nagad", Self::Bank => "bank" }
    }

    /// Route the checkout page redirects to once the order is placed.
    pub fn confirmation_path(&self, order_id: OrderId) -> String {
        format!("/checkout/{}?order={order_id}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = CartError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bkash" => Ok(Self::Bkash),
            "nagad" => Ok(Self::Nagad),
            "bank" => Ok(Self::Bank),
            _ => Err(CartError::validation("payment_method", "unsupported payment method")),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Cancelled) | (Processing, Shipped) | (Processing, Cancelled) | (Shipped, Delivered)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "processing" => Ok(Self::Processing), "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered), "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed", Self::Refunded => "refunded" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending), "paid" => Ok(Self::Paid), "failed" => Ok(Self::Failed), "refunded" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub(crate) id: OrderId,
    pub(crate) user_id: Option<UserId>,
    pub(crate) cart_items: Vec<OrderLine>,
    pub(crate) total: Decimal,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) billing: Address,
    pub(crate) shipping: Address,
    pub(crate) notes: String,
    pub(crate) status: OrderStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) created_at: DateTime<Utc>,
}

impl Order {
    /// New pending order. `total` is derived from the frozen lines.
    pub fn place(
        user_id: Option<UserId>, cart_items: Vec<OrderLine>, payment_method: PaymentMethod,
        billing: Address, shipping: Address, notes: impl Into<String>,
    ) -> Result<Self, OrderError> {
        if cart_items.is_empty() { return Err(OrderError::NoItems); }
        let total = cart_items.iter().map(OrderLine::total).sum();
        Ok(Self {
            id: OrderId::new(), user_id, cart_items, total, payment_method, billing, shipping,
            notes: notes.into(), status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> Option<UserId> { self.user_id }
    pub fn cart_items(&self) -> &[OrderLine] { &self.cart_items }
    pub fn total(&self) -> Decimal { self.total }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn billing(&self) -> &Address { &self.billing }
    pub fn shipping(&self) -> &Address { &self.shipping }
    pub fn notes(&self) -> &str { &self.notes }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Administrative status change. Lines and total are untouched.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) { self.payment_status = status; }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Cannot move order from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}
