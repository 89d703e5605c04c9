use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InventoryItemId, OrderId, OrderStatus, ProductId, SideEffectKind, SizeId};
use rust_decimal::Decimal;

use crate::{
    InventoryItemRecord, MarkerRecord, MovementRecord, OrderItemRecord, OrderRecord,
    ProductRecord, ProductSizeRecord, RecipeRuleRecord, Result,
};

/// Optional schema features detected on the connected storage.
///
/// Older databases may predate size-scoped recipes, item modifiers or the
/// preparation-time columns. The store adapts its SQL to what exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub size_scoped_rules: bool,
    pub item_modifiers: bool,
    pub preparation_times: bool,
}

impl StoreCapabilities {
    /// Every optional feature present.
    pub fn full() -> Self {
        Self {
            size_scoped_rules: true,
            item_modifiers: true,
            preparation_times: true,
        }
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Core trait for fulfillment store implementations.
///
/// Read methods take no locks and see committed data only. All mutations go
/// through a [`UnitOfWork`] obtained from [`FulfillmentStore::begin`].
#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    /// Starts an atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Returns the optional schema features of this store.
    fn capabilities(&self) -> StoreCapabilities;

    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Returns the order's lines ordered by position.
    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Returns orders in any of `statuses`, oldest first.
    ///
    /// When `created_at_or_before` is set, newer orders are excluded.
    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
        created_at_or_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderRecord>>;

    /// Returns every marker recorded for an order, oldest first.
    async fn markers(&self, order_id: OrderId) -> Result<Vec<MarkerRecord>>;

    async fn product(&self, id: ProductId) -> Result<Option<ProductRecord>>;

    async fn product_size(&self, id: SizeId) -> Result<Option<ProductSizeRecord>>;

    async fn recipe_rules(&self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>>;

    async fn inventory_item(&self, id: InventoryItemId) -> Result<Option<InventoryItemRecord>>;

    async fn inventory_items(&self) -> Result<Vec<InventoryItemRecord>>;

    /// Returns the ledger of one inventory item, oldest first.
    async fn movements(&self, item_id: InventoryItemId) -> Result<Vec<MovementRecord>>;

    /// Returns the movements that reference an order, oldest first.
    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<MovementRecord>>;

    /// Returns the signed sum of every movement of an item.
    async fn movement_sum(&self, item_id: InventoryItemId) -> Result<Decimal>;
}

/// An atomic unit of work.
///
/// Every write becomes visible only after [`UnitOfWork::commit`]. Dropping a
/// unit of work without committing rolls all of its writes back.
///
/// Locking methods (`lock_order`, `lock_inventory_items`) hold their row
/// locks until commit or rollback, so two units of work touching the same
/// order or stock item are serialised.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads an order and locks its row.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()>;

    /// Persists the mutable header fields (status, totals, times).
    async fn update_order(&mut self, order: &OrderRecord) -> Result<()>;

    async fn product(&mut self, id: ProductId) -> Result<Option<ProductRecord>>;

    async fn product_size(&mut self, id: SizeId) -> Result<Option<ProductSizeRecord>>;

    async fn recipe_rules(&mut self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>>;

    async fn insert_product(&mut self, product: &ProductRecord) -> Result<()>;

    async fn insert_product_size(&mut self, size: &ProductSizeRecord) -> Result<()>;

    async fn insert_recipe_rule(&mut self, rule: &RecipeRuleRecord) -> Result<()>;

    async fn insert_inventory_item(&mut self, item: &InventoryItemRecord) -> Result<()>;

    /// Loads and locks inventory items. Rows are locked in ascending id order
    /// and returned in that order; unknown ids are omitted.
    async fn lock_inventory_items(
        &mut self,
        ids: &[InventoryItemId],
    ) -> Result<Vec<InventoryItemRecord>>;

    /// Writes the materialized balance of an inventory item.
    async fn set_inventory_quantity(
        &mut self,
        id: InventoryItemId,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn insert_movement(&mut self, movement: &MovementRecord) -> Result<()>;

    /// Returns the automatic (non-repeat) marker for an order and kind.
    async fn find_marker(
        &mut self,
        order_id: OrderId,
        kind: SideEffectKind,
    ) -> Result<Option<MarkerRecord>>;

    async fn insert_marker(&mut self, marker: &MarkerRecord) -> Result<()>;

    /// Commits every write of this unit of work.
    async fn commit(self: Box<Self>) -> Result<()>;
}
