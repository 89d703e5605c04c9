//! The inventory ledger.
//!
//! Movements are append-only. Every balance change is a movement insert plus
//! a balance update in the same unit of work, so the materialized quantity
//! always equals the signed sum of the item's movements.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InventoryItemId, MovementId, MovementKind, MovementOrigin, OrderId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use store::{FulfillmentStore, InventoryItemRecord, MovementRecord, StoreError, UnitOfWork};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Inventory item not found: {0}")]
    UnknownItem(InventoryItemId),

    #[error("Invalid {kind} quantity: {quantity}")]
    InvalidQuantity { kind: MovementKind, quantity: Decimal },

    /// The batch would drive one or more balances below zero.
    #[error("Insufficient stock for {} item(s)", .shortfalls.len())]
    InsufficientStock { shortfalls: Vec<StockShortfall> },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A stock item that cannot cover a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockShortfall {
    pub inventory_item_id: InventoryItemId,
    pub item_name: String,
    pub required: Decimal,
    pub available: Decimal,
    pub short_by: Decimal,
}

/// What to do when a batch would drive a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockPolicy {
    /// Reject the whole batch.
    #[default]
    Strict,

    /// Remove only what is on hand and flag the movement as forced.
    ClampToZero,
}

/// A movement to append, before it is applied to a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub inventory_item_id: InventoryItemId,
    pub kind: MovementKind,
    /// Magnitude for entries and exits, signed effect for adjustments.
    pub quantity: Decimal,
    pub reason: String,
    pub origin: MovementOrigin,
    pub order_id: Option<OrderId>,
    pub created_by: Option<UserId>,
}

impl MovementRequest {
    pub fn entry(item: InventoryItemId, quantity: Decimal, origin: MovementOrigin) -> Self {
        Self::new(item, MovementKind::Entry, quantity, origin)
    }

    pub fn exit(item: InventoryItemId, quantity: Decimal, origin: MovementOrigin) -> Self {
        Self::new(item, MovementKind::Exit, quantity, origin)
    }

    pub fn adjustment(item: InventoryItemId, delta: Decimal, origin: MovementOrigin) -> Self {
        Self::new(item, MovementKind::Adjustment, delta, origin)
    }

    fn new(
        inventory_item_id: InventoryItemId,
        kind: MovementKind,
        quantity: Decimal,
        origin: MovementOrigin,
    ) -> Self {
        Self {
            inventory_item_id,
            kind,
            quantity,
            reason: String::new(),
            origin,
            order_id: None,
            created_by: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    /// The signed change this movement makes to the balance.
    pub fn signed_effect(&self) -> Decimal {
        match self.kind {
            MovementKind::Entry | MovementKind::Adjustment => self.quantity,
            MovementKind::Exit => -self.quantity,
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        let valid = match self.kind {
            MovementKind::Entry | MovementKind::Exit => self.quantity > Decimal::ZERO,
            MovementKind::Adjustment => !self.quantity.is_zero(),
        };
        if valid {
            Ok(())
        } else {
            Err(LedgerError::InvalidQuantity {
                kind: self.kind,
                quantity: self.quantity,
            })
        }
    }
}

/// Result of applying a batch.
#[derive(Debug, Clone, Default)]
pub struct LedgerOutcome {
    pub movements: Vec<MovementRecord>,
    /// Movements that removed less than requested under [`StockPolicy::ClampToZero`].
    pub clamped: Vec<StockShortfall>,
}

impl LedgerOutcome {
    pub fn forced(&self) -> bool {
        !self.clamped.is_empty()
    }
}

/// Materialized balance compared with the balance derived from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    pub inventory_item_id: InventoryItemId,
    pub item_name: String,
    pub materialized: Decimal,
    pub derived: Decimal,
    pub consistent: bool,
}

/// Compares requirements with the balances of already-loaded items.
///
/// Items missing from `items` count as zero on hand. Shortfalls are returned
/// in inventory id order.
pub fn shortfalls(
    items: &[InventoryItemRecord],
    requirements: &BTreeMap<InventoryItemId, Decimal>,
) -> Vec<StockShortfall> {
    requirements
        .iter()
        .filter_map(|(id, required)| {
            let item = items.iter().find(|i| i.id == *id);
            let available = item.map_or(Decimal::ZERO, |i| i.quantity);
            (available < *required).then(|| StockShortfall {
                inventory_item_id: *id,
                item_name: item.map_or_else(String::new, |i| i.name.clone()),
                required: *required,
                available,
                short_by: *required - available,
            })
        })
        .collect()
}

/// Append-only inventory ledger operations.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Applies a batch of movements atomically within `uow`.
    ///
    /// Every touched item row is locked in ascending id order first. With
    /// [`StockPolicy::Strict`] the batch fails as a whole when any balance
    /// would go negative; with [`StockPolicy::ClampToZero`] each outgoing
    /// movement removes at most what is on hand.
    #[tracing::instrument(skip(uow, batch), fields(movements = batch.len()))]
    pub async fn apply_movements(
        uow: &mut dyn UnitOfWork,
        batch: Vec<MovementRequest>,
        policy: StockPolicy,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, LedgerError> {
        if batch.is_empty() {
            return Ok(LedgerOutcome::default());
        }
        for request in &batch {
            request.validate()?;
        }

        let ids: Vec<InventoryItemId> = batch.iter().map(|m| m.inventory_item_id).collect();
        let locked = uow.lock_inventory_items(&ids).await?;
        let mut items: BTreeMap<InventoryItemId, InventoryItemRecord> =
            locked.into_iter().map(|i| (i.id, i)).collect();
        if let Some(missing) = ids.iter().find(|id| !items.contains_key(id)) {
            return Err(LedgerError::UnknownItem(*missing));
        }

        if policy == StockPolicy::Strict {
            let mut outflow: BTreeMap<InventoryItemId, Decimal> = BTreeMap::new();
            let mut inflow: BTreeMap<InventoryItemId, Decimal> = BTreeMap::new();
            for request in &batch {
                let effect = request.signed_effect();
                let bucket = if effect.is_sign_negative() {
                    &mut outflow
                } else {
                    &mut inflow
                };
                *bucket.entry(request.inventory_item_id).or_default() += effect.abs();
            }

            let mut short = Vec::new();
            for (id, required) in &outflow {
                let item = &items[id];
                let available = item.quantity + inflow.get(id).copied().unwrap_or_default();
                if available < *required {
                    short.push(StockShortfall {
                        inventory_item_id: *id,
                        item_name: item.name.clone(),
                        required: *required,
                        available,
                        short_by: *required - available,
                    });
                }
            }
            if !short.is_empty() {
                return Err(LedgerError::InsufficientStock { shortfalls: short });
            }
        }

        let mut outcome = LedgerOutcome::default();
        for request in batch {
            let Some(item) = items.get_mut(&request.inventory_item_id) else {
                return Err(LedgerError::UnknownItem(request.inventory_item_id));
            };

            let mut effect = request.signed_effect();
            let mut origin = request.origin;
            let mut reason = request.reason;
            if policy == StockPolicy::ClampToZero
                && effect.is_sign_negative()
                && item.quantity + effect < Decimal::ZERO
            {
                let requested = -effect;
                let available = item.quantity.max(Decimal::ZERO);
                effect = -available;
                if matches!(
                    origin,
                    MovementOrigin::AutomaticRecipe | MovementOrigin::Reconciliation
                ) {
                    origin = MovementOrigin::ForcedRecipe;
                }
                reason = format!("{reason} (forced: requested {requested}, removed {available})")
                    .trim_start()
                    .to_string();
                tracing::warn!(
                    item_id = %item.id,
                    item = %item.name,
                    %requested,
                    removed = %available,
                    "Forced deduction clamped at zero"
                );
                outcome.clamped.push(StockShortfall {
                    inventory_item_id: item.id,
                    item_name: item.name.clone(),
                    required: requested,
                    available,
                    short_by: requested - available,
                });
            }

            // Nothing left to remove; the shortfall is still reported.
            if effect.is_zero() {
                continue;
            }

            let movement = MovementRecord {
                id: MovementId::new(),
                inventory_item_id: item.id,
                kind: request.kind,
                quantity: effect,
                unit_cost: item.unit_cost,
                reason,
                origin,
                order_id: request.order_id,
                created_by: request.created_by,
                created_at: now,
            };
            uow.insert_movement(&movement).await?;
            item.quantity += effect;
            item.updated_at = now;

            metrics::counter!("inventory_movements_total", "origin" => origin.as_str())
                .increment(1);
            outcome.movements.push(movement);
        }

        for item in items.values() {
            uow.set_inventory_quantity(item.id, item.quantity, now)
                .await?;
        }

        Ok(outcome)
    }

    /// Recomputes one item's balance from its movement history.
    pub async fn verify_item<S: FulfillmentStore + ?Sized>(
        store: &S,
        item_id: InventoryItemId,
    ) -> Result<BalanceCheck, LedgerError> {
        let item = store
            .inventory_item(item_id)
            .await?
            .ok_or(LedgerError::UnknownItem(item_id))?;
        let derived = store.movement_sum(item_id).await?;
        Ok(BalanceCheck {
            inventory_item_id: item.id,
            item_name: item.name,
            materialized: item.quantity,
            derived,
            consistent: item.quantity == derived,
        })
    }

    /// Recomputes every item's balance from its movement history.
    pub async fn verify_all<S: FulfillmentStore + ?Sized>(
        store: &S,
    ) -> Result<Vec<BalanceCheck>, LedgerError> {
        let mut checks = Vec::new();
        for item in store.inventory_items().await? {
            let derived = store.movement_sum(item.id).await?;
            if item.quantity != derived {
                tracing::error!(
                    item_id = %item.id,
                    materialized = %item.quantity,
                    %derived,
                    "Inventory balance does not match movement history"
                );
            }
            checks.push(BalanceCheck {
                inventory_item_id: item.id,
                item_name: item.name,
                materialized: item.quantity,
                derived,
                consistent: item.quantity == derived,
            });
        }
        Ok(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use rust_decimal_macros::dec;
    use store::InMemoryStore;

    async fn seed(store: &InMemoryStore, name: &str, quantity: Decimal) -> InventoryItemId {
        let item = InventoryItemRecord {
            id: InventoryItemId::new(),
            name: name.to_string(),
            category: None,
            unit: "unit".to_string(),
            quantity: Decimal::ZERO,
            min_stock: Decimal::ZERO,
            max_stock: None,
            unit_cost: Money::from_cents(10),
            supplier: None,
            updated_at: Utc::now(),
        };
        let mut uow = store.begin().await.unwrap();
        uow.insert_inventory_item(&item).await.unwrap();
        if !quantity.is_zero() {
            InventoryLedger::apply_movements(
                uow.as_mut(),
                vec![MovementRequest::entry(item.id, quantity, MovementOrigin::Purchase)],
                StockPolicy::Strict,
                Utc::now(),
            )
            .await
            .unwrap();
        }
        uow.commit().await.unwrap();
        item.id
    }

    async fn apply(
        store: &InMemoryStore,
        batch: Vec<MovementRequest>,
        policy: StockPolicy,
    ) -> Result<LedgerOutcome, LedgerError> {
        let mut uow = store.begin().await.unwrap();
        let outcome = InventoryLedger::apply_movements(uow.as_mut(), batch, policy, Utc::now()).await?;
        uow.commit().await.unwrap();
        Ok(outcome)
    }

    async fn balance(store: &InMemoryStore, id: InventoryItemId) -> Decimal {
        store.inventory_item(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn exit_updates_balance_and_ledger() {
        let store = InMemoryStore::new();
        let flour = seed(&store, "flour", dec!(10)).await;

        let outcome = apply(
            &store,
            vec![MovementRequest::exit(flour, dec!(6), MovementOrigin::AutomaticRecipe)],
            StockPolicy::Strict,
        )
        .await
        .unwrap();

        assert_eq!(outcome.movements.len(), 1);
        assert_eq!(outcome.movements[0].quantity, dec!(-6));
        assert_eq!(outcome.movements[0].kind, MovementKind::Exit);
        assert!(!outcome.forced());
        assert_eq!(balance(&store, flour).await, dec!(4));
    }

    #[tokio::test]
    async fn strict_batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let flour = seed(&store, "flour", dec!(10)).await;
        let sugar = seed(&store, "sugar", dec!(1)).await;

        let result = apply(
            &store,
            vec![
                MovementRequest::exit(flour, dec!(2), MovementOrigin::Manual),
                MovementRequest::exit(sugar, dec!(3), MovementOrigin::Manual),
            ],
            StockPolicy::Strict,
        )
        .await;

        match result {
            Err(LedgerError::InsufficientStock { shortfalls }) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].inventory_item_id, sugar);
                assert_eq!(shortfalls[0].short_by, dec!(2));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(balance(&store, flour).await, dec!(10));
        assert_eq!(balance(&store, sugar).await, dec!(1));
        assert_eq!(store.movement_count().await, 2);
    }

    #[tokio::test]
    async fn clamp_policy_stops_at_zero_and_tags_forced() {
        let store = InMemoryStore::new();
        let cheese = seed(&store, "cheese", dec!(5)).await;

        let outcome = apply(
            &store,
            vec![MovementRequest::exit(cheese, dec!(6), MovementOrigin::AutomaticRecipe)],
            StockPolicy::ClampToZero,
        )
        .await
        .unwrap();

        assert!(outcome.forced());
        assert_eq!(outcome.clamped[0].short_by, dec!(1));
        assert_eq!(outcome.movements[0].quantity, dec!(-5));
        assert_eq!(outcome.movements[0].origin, MovementOrigin::ForcedRecipe);
        assert_eq!(balance(&store, cheese).await, Decimal::ZERO);

        let check = InventoryLedger::verify_item(&store, cheese).await.unwrap();
        assert!(check.consistent);
    }

    #[tokio::test]
    async fn clamp_policy_writes_no_movement_for_empty_item() {
        let store = InMemoryStore::new();
        let salsa = seed(&store, "salsa", Decimal::ZERO).await;
        let lime = seed(&store, "lime", dec!(4)).await;

        let outcome = apply(
            &store,
            vec![
                MovementRequest::exit(salsa, dec!(2), MovementOrigin::AutomaticRecipe),
                MovementRequest::exit(lime, dec!(1), MovementOrigin::AutomaticRecipe),
            ],
            StockPolicy::ClampToZero,
        )
        .await
        .unwrap();

        assert!(outcome.forced());
        assert_eq!(outcome.clamped.len(), 1);
        assert_eq!(outcome.clamped[0].inventory_item_id, salsa);
        assert_eq!(outcome.clamped[0].short_by, dec!(2));
        assert_eq!(outcome.movements.len(), 1);
        assert_eq!(outcome.movements[0].inventory_item_id, lime);
        assert!(store.movements(salsa).await.unwrap().is_empty());
        assert_eq!(balance(&store, salsa).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn clamp_policy_leaves_sufficient_movements_untouched() {
        let store = InMemoryStore::new();
        let cheese = seed(&store, "cheese", dec!(5)).await;

        let outcome = apply(
            &store,
            vec![MovementRequest::exit(cheese, dec!(2), MovementOrigin::AutomaticRecipe)],
            StockPolicy::ClampToZero,
        )
        .await
        .unwrap();

        assert!(!outcome.forced());
        assert_eq!(outcome.movements[0].origin, MovementOrigin::AutomaticRecipe);
    }

    #[tokio::test]
    async fn unknown_item_rejects_batch() {
        let store = InMemoryStore::new();
        let missing = InventoryItemId::new();

        let result = apply(
            &store,
            vec![MovementRequest::entry(missing, dec!(1), MovementOrigin::Purchase)],
            StockPolicy::Strict,
        )
        .await;

        assert!(matches!(result, Err(LedgerError::UnknownItem(id)) if id == missing));
    }

    #[tokio::test]
    async fn zero_quantity_exit_is_invalid() {
        let store = InMemoryStore::new();
        let flour = seed(&store, "flour", dec!(1)).await;

        let result = apply(
            &store,
            vec![MovementRequest::exit(flour, Decimal::ZERO, MovementOrigin::Manual)],
            StockPolicy::Strict,
        )
        .await;

        assert!(matches!(result, Err(LedgerError::InvalidQuantity { .. })));
    }

    #[tokio::test]
    async fn adjustments_are_signed() {
        let store = InMemoryStore::new();
        let oil = seed(&store, "oil", dec!(3)).await;

        apply(
            &store,
            vec![
                MovementRequest::adjustment(oil, dec!(-1.25), MovementOrigin::Manual),
                MovementRequest::adjustment(oil, dec!(0.5), MovementOrigin::Manual),
            ],
            StockPolicy::Strict,
        )
        .await
        .unwrap();

        assert_eq!(balance(&store, oil).await, dec!(2.25));
        let checks = InventoryLedger::verify_all(&store).await.unwrap();
        assert!(checks.iter().all(|c| c.consistent));
    }

    #[test]
    fn shortfalls_treat_missing_items_as_empty() {
        let id = InventoryItemId::new();
        let requirements = BTreeMap::from([(id, dec!(2))]);

        let short = shortfalls(&[], &requirements);

        assert_eq!(short.len(), 1);
        assert_eq!(short[0].available, Decimal::ZERO);
        assert_eq!(short[0].short_by, dec!(2));
    }
}
