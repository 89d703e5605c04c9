pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    CustomerInfo, InventoryItemRecord, ItemModifierRecord, MarkerRecord, MovementRecord,
    OrderItemRecord, OrderRecord, ProductRecord, ProductSizeRecord, RecipeRuleRecord,
};
pub use store::{FulfillmentStore, StoreCapabilities, UnitOfWork};
