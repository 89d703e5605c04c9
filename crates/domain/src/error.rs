//! Domain error types.

use common::{OrderId, ProductId, SizeId};
use store::StoreError;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::order::OrderError;
use crate::recipe::RecipeError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Recipe error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Order not found: {0}")]
    UnknownOrder(OrderId),

    #[error("Product not found: {0}")]
    UnknownProduct(ProductId),

    #[error("Size {size_id} not found for product {product_id}")]
    UnknownSize {
        product_id: ProductId,
        size_id: SizeId,
    },
}
