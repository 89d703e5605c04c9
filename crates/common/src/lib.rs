//! Shared vocabulary for the order-fulfillment core.

mod money;
mod status;
mod stock;
mod types;

pub use money::Money;
pub use status::{OrderStatus, UnknownStatus};
pub use stock::{ItemCustomization, MovementKind, MovementOrigin, SideEffectKind, UnknownName};
pub use types::{
    CustomerId, InventoryItemId, MarkerId, ModifierOptionId, MovementId, OrderId, OrderItemId,
    ProductId, RecipeRuleId, SizeId, TableId, UserId,
};
