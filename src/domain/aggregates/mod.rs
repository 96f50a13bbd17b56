//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::Product;
pub use order::{Address, Order, OrderError, OrderLine, OrderStatus, PaymentMethod, PaymentStatus};
pub use cart::{CartEntry, CartItem, CartSummary, GuestCartItem, ProductSnapshot};
