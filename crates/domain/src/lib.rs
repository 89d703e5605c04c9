//! Domain layer for order fulfillment.
//!
//! This crate provides:
//! - the Order aggregate (creation, item addition, totals, transition planning)
//! - the recipe resolver mapping order lines to ingredient consumption
//! - the inventory ledger applying movement batches and checking balances

pub mod error;
pub mod ledger;
pub mod order;
pub mod recipe;

pub use error::DomainError;
pub use ledger::{
    BalanceCheck, InventoryLedger, LedgerError, LedgerOutcome, MovementRequest, StockPolicy,
    StockShortfall, shortfalls,
};
pub use order::{
    AddItems, CreateOrder, NewItem, Order, OrderError, OrderService, OrderTotals, PricedItem,
    PricingPolicy, TransitionPlan, lock_order,
};
pub use recipe::{
    ConsumptionLine, OrderConsumption, RecipeBook, RecipeError, aggregate_requirements,
    resolve_consumption,
};
