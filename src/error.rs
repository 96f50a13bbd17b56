//! Error types for the cart and checkout engine

use thiserror::Error;

use crate::domain::value_objects::ProductId;

/// Failure reported by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    #[error("Cart quantity for product {0} would exceed the maximum")]
    QuantityOverflow(ProductId),
}

/// Discriminated result of every cart, merge and checkout operation.
#[derive(Error, Debug)]
pub enum CartError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Stock { product_id: ProductId, requested: u32, available: u32 },

    #[error("Storage error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Could not merge product {product_id} into the user cart: {reason}")]
    MergeConflict { product_id: ProductId, reason: String },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Cart item not found for product {0}")]
    ItemNotFound(ProductId),

    #[error("Authentication required")]
    Unauthenticated,
}

impl CartError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Name of the offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self { Self::Persistence(StoreError::Database(e)) }
}

pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_field() {
        let err = CartError::validation("billing.phone", "is required");
        assert_eq!(err.field(), Some("billing.phone"));
        assert_eq!(err.to_string(), "Invalid billing.phone: is required");
        assert_eq!(CartError::Unauthenticated.field(), None);
    }
}
