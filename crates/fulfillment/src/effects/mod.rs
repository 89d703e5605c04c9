//! The side effects triggered when an order becomes ready.

mod deduction;
mod ticket;

pub use deduction::InventoryDeduction;
pub use ticket::KitchenTicket;
