use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    InventoryItemId, OrderId, OrderStatus, ProductId, SideEffectKind, SizeId,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    InventoryItemRecord, MarkerRecord, MovementRecord, OrderItemRecord, OrderRecord,
    ProductRecord, ProductSizeRecord, RecipeRuleRecord, Result, StoreError,
    store::{FulfillmentStore, StoreCapabilities, UnitOfWork},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: HashMap<OrderId, OrderRecord>,
    order_items: HashMap<OrderId, Vec<OrderItemRecord>>,
    products: HashMap<ProductId, ProductRecord>,
    sizes: HashMap<SizeId, ProductSizeRecord>,
    rules: Vec<RecipeRuleRecord>,
    inventory: BTreeMap<InventoryItemId, InventoryItemRecord>,
    movements: Vec<MovementRecord>,
    markers: Vec<MarkerRecord>,
}

impl MemoryState {
    fn order_items(&self, order_id: OrderId) -> Vec<OrderItemRecord> {
        let mut items = self.order_items.get(&order_id).cloned().unwrap_or_default();
        items.sort_by_key(|i| i.position);
        items
    }

    fn rules_for(&self, product_id: ProductId) -> Vec<RecipeRuleRecord> {
        self.rules
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct FailureSwitches {
    unavailable: AtomicBool,
    fail_next_movement: AtomicBool,
}

/// In-memory fulfillment store for testing and single-process use.
///
/// A unit of work owns the whole state for its lifetime and edits a working
/// copy that replaces the state on commit, so units of work are fully
/// serialised. Read methods wait for any open unit of work to finish; code
/// holding a unit of work must read through it, never through the store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    switches: Arc<FailureSwitches>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.switches.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next movement insert fail with a storage error.
    pub fn fail_next_movement_insert(&self) {
        self.switches.fail_next_movement.store(true, Ordering::SeqCst);
    }

    /// Returns the total number of ledger movements stored.
    pub async fn movement_count(&self) -> usize {
        self.state.lock().await.movements.len()
    }

    /// Returns the total number of side-effect markers stored.
    pub async fn marker_count(&self) -> usize {
        self.state.lock().await.markers.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.switches.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn read(&self) -> Result<tokio::sync::MutexGuard<'_, MemoryState>> {
        self.check_available()?;
        Ok(self.state.lock().await)
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.check_available()?;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            switches: self.switches.clone(),
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::full()
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.read().await?.orders.get(&id).cloned())
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self.read().await?.order_items(order_id))
    }

    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
        created_at_or_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderRecord>> {
        let state = self.read().await?;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| statuses.contains(&o.status))
            .filter(|o| created_at_or_before.is_none_or(|cutoff| o.created_at <= cutoff))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn markers(&self, order_id: OrderId) -> Result<Vec<MarkerRecord>> {
        let state = self.read().await?;
        Ok(state
            .markers
            .iter()
            .filter(|m| m.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.read().await?.products.get(&id).cloned())
    }

    async fn product_size(&self, id: SizeId) -> Result<Option<ProductSizeRecord>> {
        Ok(self.read().await?.sizes.get(&id).cloned())
    }

    async fn recipe_rules(&self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>> {
        Ok(self.read().await?.rules_for(product_id))
    }

    async fn inventory_item(&self, id: InventoryItemId) -> Result<Option<InventoryItemRecord>> {
        Ok(self.read().await?.inventory.get(&id).cloned())
    }

    async fn inventory_items(&self) -> Result<Vec<InventoryItemRecord>> {
        Ok(self.read().await?.inventory.values().cloned().collect())
    }

    async fn movements(&self, item_id: InventoryItemId) -> Result<Vec<MovementRecord>> {
        let state = self.read().await?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.inventory_item_id == item_id)
            .cloned()
            .collect())
    }

    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<MovementRecord>> {
        let state = self.read().await?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn movement_sum(&self, item_id: InventoryItemId) -> Result<Decimal> {
        let state = self.read().await?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.inventory_item_id == item_id)
            .map(|m| m.quantity)
            .sum())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    switches: Arc<FailureSwitches>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self.working.order_items(order_id))
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_pkey".to_string(),
            });
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()> {
        for item in items {
            if !self.working.orders.contains_key(&item.order_id) {
                return Err(StoreError::corrupt("order_items", "order does not exist"));
            }
            self.working
                .order_items
                .entry(item.order_id)
                .or_default()
                .push(item.clone());
        }
        Ok(())
    }

    async fn update_order(&mut self, order: &OrderRecord) -> Result<()> {
        match self.working.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::corrupt("orders", "order does not exist")),
        }
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn product_size(&mut self, id: SizeId) -> Result<Option<ProductSizeRecord>> {
        Ok(self.working.sizes.get(&id).cloned())
    }

    async fn recipe_rules(&mut self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>> {
        Ok(self.working.rules_for(product_id))
    }

    async fn insert_product(&mut self, product: &ProductRecord) -> Result<()> {
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn insert_product_size(&mut self, size: &ProductSizeRecord) -> Result<()> {
        self.working.sizes.insert(size.id, size.clone());
        Ok(())
    }

    async fn insert_recipe_rule(&mut self, rule: &RecipeRuleRecord) -> Result<()> {
        self.working.rules.push(rule.clone());
        Ok(())
    }

    async fn insert_inventory_item(&mut self, item: &InventoryItemRecord) -> Result<()> {
        if self.working.inventory.contains_key(&item.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "inventory_items_pkey".to_string(),
            });
        }
        self.working.inventory.insert(item.id, item.clone());
        Ok(())
    }

    async fn lock_inventory_items(
        &mut self,
        ids: &[InventoryItemId],
    ) -> Result<Vec<InventoryItemRecord>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.working.inventory.get(&id).cloned())
            .collect())
    }

    async fn set_inventory_quantity(
        &mut self,
        id: InventoryItemId,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let item = self
            .working
            .inventory
            .get_mut(&id)
            .ok_or_else(|| StoreError::corrupt("inventory_items", "item does not exist"))?;
        item.quantity = quantity;
        item.updated_at = at;
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &MovementRecord) -> Result<()> {
        if self.switches.fail_next_movement.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "simulated movement insert failure",
            ))));
        }
        if !self.working.inventory.contains_key(&movement.inventory_item_id) {
            return Err(StoreError::corrupt(
                "inventory_movements",
                "inventory item does not exist",
            ));
        }
        self.working.movements.push(movement.clone());
        Ok(())
    }

    async fn find_marker(
        &mut self,
        order_id: OrderId,
        kind: SideEffectKind,
    ) -> Result<Option<MarkerRecord>> {
        Ok(self
            .working
            .markers
            .iter()
            .find(|m| m.order_id == order_id && m.kind == kind && !m.is_repeat)
            .cloned())
    }

    async fn insert_marker(&mut self, marker: &MarkerRecord) -> Result<()> {
        let duplicate = !marker.is_repeat
            && self.working.markers.iter().any(|m| {
                m.order_id == marker.order_id && m.kind == marker.kind && !m.is_repeat
            });
        if duplicate {
            return Err(StoreError::UniqueViolation {
                constraint: "unique_automatic_marker".to_string(),
            });
        }
        self.working.markers.push(marker.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, MovementId, MovementKind, MovementOrigin, UserId};
    use rust_decimal_macros::dec;

    fn inventory_item(name: &str) -> InventoryItemRecord {
        InventoryItemRecord {
            id: InventoryItemId::new(),
            name: name.to_string(),
            category: None,
            unit: "unit".to_string(),
            quantity: Decimal::ZERO,
            min_stock: Decimal::ZERO,
            max_stock: None,
            unit_cost: Money::from_cents(50),
            supplier: None,
            updated_at: Utc::now(),
        }
    }

    fn movement(item: InventoryItemId, quantity: Decimal) -> MovementRecord {
        MovementRecord {
            id: MovementId::new(),
            inventory_item_id: item,
            kind: MovementKind::Entry,
            quantity,
            unit_cost: Money::from_cents(50),
            reason: "delivery".to_string(),
            origin: MovementOrigin::Purchase,
            order_id: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn marker(order_id: OrderId, is_repeat: bool) -> MarkerRecord {
        MarkerRecord {
            id: common::MarkerId::new(),
            order_id,
            kind: SideEffectKind::PrintTicket,
            is_repeat,
            forced: false,
            performed_by: UserId::new(),
            performed_at: Utc::now(),
            detail: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryStore::new();
        let item = inventory_item("flour");

        let mut uow = store.begin().await.unwrap();
        uow.insert_inventory_item(&item).await.unwrap();
        uow.insert_movement(&movement(item.id, dec!(5))).await.unwrap();
        uow.set_inventory_quantity(item.id, dec!(5), Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.inventory_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, dec!(5));
        assert_eq!(store.movement_sum(item.id).await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();
        let item = inventory_item("sugar");

        {
            let mut uow = store.begin().await.unwrap();
            uow.insert_inventory_item(&item).await.unwrap();
        }

        assert!(store.inventory_item(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lock_inventory_items_returns_sorted_known_ids() {
        let store = InMemoryStore::new();
        let a = inventory_item("a");
        let b = inventory_item("b");

        let mut uow = store.begin().await.unwrap();
        uow.insert_inventory_item(&a).await.unwrap();
        uow.insert_inventory_item(&b).await.unwrap();
        let locked = uow
            .lock_inventory_items(&[b.id, a.id, b.id, InventoryItemId::new()])
            .await
            .unwrap();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(locked.iter().map(|i| i.id).collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn duplicate_automatic_marker_is_rejected() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();

        let mut uow = store.begin().await.unwrap();
        uow.insert_marker(&marker(order_id, false)).await.unwrap();
        uow.insert_marker(&marker(order_id, true)).await.unwrap();
        let result = uow.insert_marker(&marker(order_id, false)).await;

        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
    }

    #[tokio::test]
    async fn find_marker_ignores_repeat_rows() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();

        let mut uow = store.begin().await.unwrap();
        uow.insert_marker(&marker(order_id, true)).await.unwrap();
        let found = uow
            .find_marker(order_id, SideEffectKind::PrintTicket)
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_fails_fast() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.begin().await,
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        ));
        assert!(store.inventory_items().await.is_err());

        store.set_unavailable(false);
        assert!(store.inventory_items().await.is_ok());
    }

    #[tokio::test]
    async fn simulated_movement_failure_fires_once() {
        let store = InMemoryStore::new();
        let item = inventory_item("salt");
        store.fail_next_movement_insert();

        let mut uow = store.begin().await.unwrap();
        uow.insert_inventory_item(&item).await.unwrap();
        assert!(uow.insert_movement(&movement(item.id, dec!(1))).await.is_err());
        assert!(uow.insert_movement(&movement(item.id, dec!(1))).await.is_ok());
    }
}
