//! OpenSASE E-commerce Checkout Core
//!
//! Cart management, inventory reservation and checkout for the OpenSASE
//! e-commerce service.
//!
//! ## Features
//! - Per-user carts validated against live stock
//! - Race-free inventory reservation and release
//! - Atomic checkout: lock, validate, claim stock, create order, clear cart
//! - Immutable orders with purchase-time price snapshots
//!
//! Catalog data and caller identity come from collaborators; the core reads
//! variant prices through [`store::CatalogLookup`] and trusts the user id it
//! is handed.

pub mod api;
pub mod config;
pub mod domain;
pub mod publisher;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{CartError, InventoryError, OrderError};
use crate::domain::value_objects::{CurrencyError, MoneyError, QuantityError, VariantId};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for variant {variant_id}. Available: {available}, requested: {requested}")]
    InsufficientStock { variant_id: VariantId, available: i64, requested: u32 },

    /// Lock contention, timeout or concurrent modification; safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store fault. The detail is for logs only.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EcommerceError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound { resource, id: id.to_string() }
    }

    /// Transient failures the caller may retry immediately.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Conflict(_)) }
}

impl From<QuantityError> for EcommerceError {
    fn from(e: QuantityError) -> Self { Self::Validation(e.to_string()) }
}

impl From<CurrencyError> for EcommerceError {
    fn from(e: CurrencyError) -> Self { Self::Validation(e.to_string()) }
}

impl From<MoneyError> for EcommerceError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::Overflow => Self::Validation("amount exceeds the largest supported total".to_string()),
            MoneyError::Negative(_) => Self::Storage(e.to_string()),
        }
    }
}

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound(id) => Self::not_found("Cart item", id),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<InventoryError> for EcommerceError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::Insufficient { variant_id, available, requested } => Self::InsufficientStock { variant_id, available, requested },
            InventoryError::AboveStockLimit { .. } | InventoryError::ReservedExceedsAvailable { .. } => Self::Validation(e.to_string()),
            InventoryError::NegativeCounter { .. } | InventoryError::CounterOverflow(_) => Self::Storage(e.to_string()),
        }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::EmptyCart,
            OrderError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            OrderError::Money(money) => money.into(),
            OrderError::UnknownStatus(_) | OrderError::Corrupt(..) => Self::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_classification() {
        let e: EcommerceError = InventoryError::Insufficient { variant_id: VariantId::new(2), available: 1, requested: 3 }.into();
        assert!(matches!(e, EcommerceError::InsufficientStock { requested: 3, .. }));
        let e: EcommerceError = OrderError::NoItems.into();
        assert!(matches!(e, EcommerceError::EmptyCart));
        assert!(EcommerceError::Conflict("lock timeout".into()).is_retryable());
        assert!(!EcommerceError::EmptyCart.is_retryable());
    }

    #[test]
    fn test_money_overflow_is_a_validation_error() {
        assert!(matches!(EcommerceError::from(MoneyError::Overflow), EcommerceError::Validation(_)));
        assert!(matches!(EcommerceError::from(OrderError::Money(MoneyError::Overflow)), EcommerceError::Validation(_)));
        assert!(matches!(EcommerceError::from(MoneyError::Negative(-5)), EcommerceError::Storage(_)));
    }
}
