//! Value Objects for the cart and checkout engine

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CartError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self { Self(Uuid::now_v7()) }
            pub const fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub const fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl Default for $name {
            fn default() -> Self { Self::new() }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self { Self(id) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

uuid_id!(
    /// Catalog product identifier
    ProductId
);
uuid_id!(
    /// Authenticated user identifier
    UserId
);
uuid_id!(
    /// Server-assigned identifier of a persisted cart row
    CartItemId
);
uuid_id!(
    /// Server-assigned order identifier
    OrderId
);

/// Quantity value object. Always in `1..=i32::MAX`, the range of the
/// `INTEGER` quantity column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(i32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);
    pub const MAX: Quantity = Quantity(i32::MAX);

    pub fn new(value: i64) -> Result<Self, CartError> {
        if value <= 0 {
            return Err(CartError::validation("quantity", "quantity must be a positive integer"));
        }
        i32::try_from(value)
            .map(Self)
            .map_err(|_| CartError::validation("quantity", "quantity is too large"))
    }

    pub fn value(&self) -> u32 { self.0.unsigned_abs() }

    /// Sum of two quantities; fails instead of wrapping past the maximum.
    pub fn checked_add(&self, other: Quantity) -> Result<Self, CartError> {
        Self::new(i64::from(self.0) + i64::from(other.0))
    }

    /// What is left after taking `other` away; `None` once nothing is left.
    pub fn checked_sub(&self, other: Quantity) -> Option<Self> {
        Self::new(i64::from(self.0) - i64::from(other.0)).ok()
    }
}

impl TryFrom<i64> for Quantity {
    type Error = CartError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.value() }
}

impl From<Quantity> for i32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
