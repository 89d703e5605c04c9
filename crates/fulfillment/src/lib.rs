//! Order fulfillment with exactly-once side effects.
//!
//! This crate provides:
//! - the order state machine, which deducts ingredients and stages the
//!   kitchen ticket when an order becomes ready
//! - the side-effect coordinator guarding each (order, effect) pair with a
//!   durable marker written in the same unit of work as the effect
//! - the reconciliation job backfilling deductions that were never recorded
//! - the printer and notifier collaborators and the service facade

pub mod coordinator;
pub mod effects;
pub mod error;
pub mod events;
pub mod reconciliation;
pub mod service;
pub mod services;
pub mod state_machine;

pub use coordinator::{EffectContext, EnsureOutcome, Performed, SideEffect, SideEffectCoordinator};
pub use effects::{InventoryDeduction, KitchenTicket};
pub use error::{FulfillmentError, Result};
pub use events::FulfillmentEvent;
pub use reconciliation::{
    ReconciliationFailure, ReconciliationJob, ReconciliationOptions, ReconciliationReport,
};
pub use service::{
    DeductionOutcome, FulfillmentService, IngredientAvailability, NewInventoryItem, OrderDetail,
    ProductDefinition, ReprintOutcome, StockAvailability, StockMovementInput,
};
pub use services::{
    BroadcastNotifier, FileTicketPrinter, InMemoryNotifier, InMemoryTicketPrinter, NotifyError,
    Notifier, PrintError, PrintReceipt, TicketPrinter,
};
pub use state_machine::{OrderStateMachine, TicketDispatch, TransitionOptions, TransitionOutcome};
