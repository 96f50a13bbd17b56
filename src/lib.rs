//! OpenSASE Checkout
//!
//! Cart and checkout consistency engine for the OpenSASE storefront.
//!
//! ## Features
//! - Single effective-price rule shared by cart display and checkout
//! - One cart interface over a client-held guest cart and a server-side user cart
//! - Guest → user cart merge on login that never drops items
//! - Write-once order snapshots assembled from live catalog prices

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod reconcile;
pub mod store;

pub use cart::{CartBackend, CartMode, CartStore, GuestCart, Session, UserCart};
pub use checkout::{CheckoutAssembler, CheckoutRequest};
pub use domain::aggregates::{
    Address, CartEntry, CartItem, CartSummary, GuestCartItem, Order, OrderLine, OrderStatus, PaymentMethod,
    PaymentStatus, Product, ProductSnapshot,
};
pub use domain::pricing::{resolve_price, PriceFields, Priced};
pub use domain::value_objects::{CartItemId, OrderId, ProductId, Quantity, UserId};
pub use error::{CartError, Result, StoreError};
pub use reconcile::{MergeReport, Reconciler};
