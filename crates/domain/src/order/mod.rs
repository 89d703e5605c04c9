//! Order aggregate and related types.

mod aggregate;
mod commands;
mod service;
mod value_objects;

pub use aggregate::Order;
pub use commands::{AddItems, CreateOrder, NewItem};
pub use service::{OrderService, lock_order};
pub use value_objects::{OrderTotals, PricedItem, PricingPolicy, TransitionPlan};

use common::{OrderStatus, ProductId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid state transition: cannot move from {current} to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// Items can no longer be added in the current status.
    #[error("Items cannot be added to an order in {status} state")]
    ItemsLocked { status: OrderStatus },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// Modifiers may be free but never discount the line.
    #[error("Invalid price for modifier {name}: {price} (must not be negative)")]
    InvalidModifierPrice { name: String, price: i64 },

    /// An amount does not fit in the money representation.
    #[error("Amount overflow while computing {0}")]
    AmountOverflow(&'static str),

    #[error("Invalid discount: {discount} exceeds subtotal {subtotal}")]
    InvalidDiscount { discount: i64, subtotal: i64 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Product exists but is no longer sold.
    #[error("Product {product_id} is not active")]
    InactiveProduct { product_id: ProductId },
}
