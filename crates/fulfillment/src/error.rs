//! Fulfillment error types.

use common::{InventoryItemId, OrderId, OrderStatus, ProductId, SideEffectKind, SizeId};
use domain::{DomainError, LedgerError, OrderError, RecipeError, StockShortfall};
use store::StoreError;
use thiserror::Error;

/// Errors returned at the fulfillment boundary.
///
/// Every failure leaves storage untouched: the unit of work it ran in is
/// rolled back before the error reaches the caller.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The requested status is not a legal edge from the current one.
    #[error("Invalid state transition: cannot move from {current} to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// One or more ingredients cannot cover the order. Retry with `force`.
    #[error("Insufficient stock for {} item(s)", .shortfalls.len())]
    InsufficientStock { shortfalls: Vec<StockShortfall> },

    #[error("Order not found: {0}")]
    UnknownOrder(OrderId),

    #[error("Product not found: {0}")]
    UnknownProduct(ProductId),

    #[error("Size {size_id} not found for product {product_id}")]
    UnknownSize {
        product_id: ProductId,
        size_id: SizeId,
    },

    #[error("Inventory item not found: {0}")]
    UnknownInventoryItem(InventoryItemId),

    /// The order or its lines violate an order rule.
    #[error("Invalid order: {0}")]
    InvalidOrder(OrderError),

    /// A stock movement was rejected before touching the ledger.
    #[error("Invalid stock movement: {0}")]
    InvalidMovement(String),

    /// Storage could not be reached or timed out. Safe to retry.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    /// The write collides with a row that already exists, such as a reused
    /// order id.
    #[error("Conflict: {0}")]
    Conflict(#[source] StoreError),

    /// Storage rejected the unit of work for a reason retrying will not fix.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    /// A product definition is inconsistent.
    #[error("Invalid product definition: {0}")]
    InvalidCatalog(String),

    /// The side effect itself failed; nothing was committed.
    #[error("Side effect {kind} failed: {reason}")]
    SideEffectFailed { kind: SideEffectKind, reason: String },
}

impl FulfillmentError {
    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FulfillmentError::StorageUnavailable(_))
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            err if err.is_transient() => FulfillmentError::StorageUnavailable(err),
            err @ StoreError::UniqueViolation { .. } => FulfillmentError::Conflict(err),
            err => FulfillmentError::Storage(err),
        }
    }
}

impl From<LedgerError> for FulfillmentError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownItem(id) => FulfillmentError::UnknownInventoryItem(id),
            LedgerError::InvalidQuantity { .. } => {
                FulfillmentError::InvalidMovement(err.to_string())
            }
            LedgerError::InsufficientStock { shortfalls } => {
                FulfillmentError::InsufficientStock { shortfalls }
            }
            LedgerError::Store(err) => err.into(),
        }
    }
}

impl From<RecipeError> for FulfillmentError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::UnknownProduct(id) => FulfillmentError::UnknownProduct(id),
            RecipeError::InvalidFactor { .. } => FulfillmentError::SideEffectFailed {
                kind: SideEffectKind::InventoryDeduct,
                reason: err.to_string(),
            },
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { current, requested } => {
                FulfillmentError::InvalidTransition { current, requested }
            }
            err => FulfillmentError::InvalidOrder(err),
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Store(err) => err.into(),
            DomainError::Order(err) => err.into(),
            DomainError::Recipe(err) => err.into(),
            DomainError::Ledger(err) => err.into(),
            DomainError::UnknownOrder(id) => FulfillmentError::UnknownOrder(id),
            DomainError::UnknownProduct(id) => FulfillmentError::UnknownProduct(id),
            DomainError::UnknownSize {
                product_id,
                size_id,
            } => FulfillmentError::UnknownSize {
                product_id,
                size_id,
            },
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn only_transient_storage_failures_are_retryable() {
        let timeout = FulfillmentError::from(StoreError::Database(sqlx::Error::PoolTimedOut));
        assert!(matches!(timeout, FulfillmentError::StorageUnavailable(_)));
        assert!(timeout.is_retryable());

        let missing = FulfillmentError::from(StoreError::Unsupported("item_modifiers"));
        assert!(matches!(missing, FulfillmentError::Storage(_)));
        assert!(!missing.is_retryable());

        let duplicate = FulfillmentError::from(StoreError::UniqueViolation {
            constraint: "orders_pkey".to_string(),
        });
        assert!(matches!(duplicate, FulfillmentError::Conflict(_)));
        assert!(!duplicate.is_retryable());

        let transition = FulfillmentError::from(DomainError::Order(
            OrderError::InvalidTransition {
                current: OrderStatus::Created,
                requested: OrderStatus::Paid,
            },
        ));
        assert!(matches!(
            transition,
            FulfillmentError::InvalidTransition {
                current: OrderStatus::Created,
                requested: OrderStatus::Paid
            }
        ));
        assert!(!transition.is_retryable());
    }

    #[test]
    fn ledger_shortfalls_are_preserved() {
        let item = InventoryItemId::new();
        let err = FulfillmentError::from(LedgerError::InsufficientStock {
            shortfalls: vec![StockShortfall {
                inventory_item_id: item,
                item_name: "cheese".to_string(),
                required: Decimal::from(6),
                available: Decimal::from(5),
                short_by: Decimal::ONE,
            }],
        });

        match err {
            FulfillmentError::InsufficientStock { shortfalls } => {
                assert_eq!(shortfalls[0].inventory_item_id, item);
                assert_eq!(shortfalls[0].short_by, Decimal::ONE);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
    }

    #[test]
    fn order_rules_map_to_invalid_order() {
        let err = FulfillmentError::from(DomainError::Order(OrderError::NoItems));
        assert!(matches!(
            err,
            FulfillmentError::InvalidOrder(OrderError::NoItems)
        ));
    }
}
