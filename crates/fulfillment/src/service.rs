//! The fulfillment facade used by the HTTP layer.

use std::sync::Arc;

use chrono::Utc;
use common::{
    InventoryItemId, Money, MovementKind, MovementOrigin, OrderId, OrderStatus, SideEffectKind,
    UserId,
};
use domain::{
    AddItems, BalanceCheck, CreateOrder, InventoryLedger, MovementRequest, Order, OrderService,
    PricingPolicy, RecipeBook, StockPolicy, StockShortfall, lock_order, shortfalls,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{
    FulfillmentStore, InventoryItemRecord, MarkerRecord, MovementRecord, ProductRecord,
    ProductSizeRecord, RecipeRuleRecord,
};

use crate::coordinator::{EffectContext, SideEffectCoordinator};
use crate::effects::{InventoryDeduction, KitchenTicket};
use crate::error::FulfillmentError;
use crate::events::{
    FulfillmentEvent, ItemsAddedData, OrderCreatedData, ReconciliationData, StatusChangedData,
    StockMovementData, TicketPrintFailedData,
};
use crate::reconciliation::{ReconciliationJob, ReconciliationOptions, ReconciliationReport};
use crate::services::{Notifier, PrintReceipt, TicketPrinter};
use crate::state_machine::{
    OrderStateMachine, TicketDispatch, TransitionOptions, TransitionOutcome,
};

/// An order with its side-effect audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub markers: Vec<MarkerRecord>,
    pub movements: Vec<MovementRecord>,
}

impl OrderDetail {
    /// True when the automatic deduction marker exists.
    pub fn deducted(&self) -> bool {
        self.has_automatic(SideEffectKind::InventoryDeduct)
    }

    /// True when the automatic print marker exists.
    pub fn printed(&self) -> bool {
        self.has_automatic(SideEffectKind::PrintTicket)
    }

    fn has_automatic(&self, kind: SideEffectKind) -> bool {
        self.markers.iter().any(|m| m.kind == kind && !m.is_repeat)
    }
}

/// A manual reprint and its audit marker.
#[derive(Debug, Clone, Serialize)]
pub struct ReprintOutcome {
    pub marker: MarkerRecord,
    pub receipt: PrintReceipt,
}

/// An operator-requested deduction and its audit marker.
#[derive(Debug, Clone, Serialize)]
pub struct DeductionOutcome {
    pub marker: MarkerRecord,
    pub movements: Vec<MovementRecord>,
    pub clamped: Vec<StockShortfall>,
}

/// Requirement of one ingredient compared with what is on hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientAvailability {
    pub inventory_item_id: InventoryItemId,
    pub item_name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAvailability {
    pub order_id: OrderId,
    pub ingredients: Vec<IngredientAvailability>,
    pub shortfalls: Vec<StockShortfall>,
}

impl StockAvailability {
    pub fn sufficient(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

/// A stock item to create. The balance starts at zero and any initial
/// quantity is booked as a purchase entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unit: String,
    #[serde(default)]
    pub initial_quantity: Decimal,
    #[serde(default)]
    pub min_stock: Decimal,
    #[serde(default)]
    pub max_stock: Option<Decimal>,
    pub unit_cost: Money,
    #[serde(default)]
    pub supplier: Option<String>,
}

/// An operator-entered ledger movement.
#[derive(Debug, Clone, Deserialize)]
pub struct StockMovementInput {
    pub inventory_item_id: InventoryItemId,
    pub kind: MovementKind,
    /// Magnitude for entries and exits, signed delta for adjustments.
    pub quantity: Decimal,
    #[serde(default)]
    pub reason: String,
}

/// A product with its sizes and recipe, as maintained by product management.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDefinition {
    pub product: ProductRecord,
    #[serde(default)]
    pub sizes: Vec<ProductSizeRecord>,
    #[serde(default)]
    pub recipe: Vec<RecipeRuleRecord>,
}

impl ProductDefinition {
    /// Checks that prices are positive, every size and rule belongs to the
    /// product, size-scoped rules name a size of this definition and every
    /// rule consumes a positive quantity.
    pub fn validate(&self) -> Result<(), FulfillmentError> {
        let product = &self.product;
        let invalid = |reason: String| Err(FulfillmentError::InvalidCatalog(reason));

        if !product.base_price.is_positive() {
            return invalid(format!("base price {} must be positive", product.base_price));
        }
        for size in &self.sizes {
            if size.product_id != product.id {
                return invalid(format!("size {} belongs to another product", size.id));
            }
            if !size.price.is_positive() {
                return invalid(format!("size {} price {} must be positive", size.id, size.price));
            }
        }
        for rule in &self.recipe {
            if rule.product_id != product.id {
                return invalid(format!("recipe rule {} belongs to another product", rule.id));
            }
            if let Some(size_id) = rule.size_id
                && !self.sizes.iter().any(|size| size.id == size_id)
            {
                return invalid(format!(
                    "recipe rule {} names unknown size {size_id}",
                    rule.id
                ));
            }
            if rule.quantity_per_unit <= Decimal::ZERO {
                return invalid(format!(
                    "recipe rule {} quantity {} must be positive",
                    rule.id, rule.quantity_per_unit
                ));
            }
        }
        Ok(())
    }
}

/// Entry point for every fulfillment operation.
///
/// Storage work is committed before any printer or notifier call, and those
/// collaborators can fail without affecting what was committed.
pub struct FulfillmentService<S, P, N>
where
    S: FulfillmentStore,
    P: TicketPrinter,
    N: Notifier,
{
    store: Arc<S>,
    orders: OrderService<S>,
    machine: OrderStateMachine<S>,
    reconciliation: ReconciliationJob<S>,
    printer: Arc<P>,
    notifier: Arc<N>,
}

impl<S, P, N> FulfillmentService<S, P, N>
where
    S: FulfillmentStore,
    P: TicketPrinter,
    N: Notifier,
{
    pub fn new(store: Arc<S>, printer: Arc<P>, notifier: Arc<N>, policy: PricingPolicy) -> Self {
        Self {
            orders: OrderService::new(store.clone(), policy),
            machine: OrderStateMachine::new(store.clone()),
            reconciliation: ReconciliationJob::new(store.clone()),
            store,
            printer,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, FulfillmentError> {
        let order = self.orders.create_order(cmd).await?;
        self.publish(FulfillmentEvent::OrderCreated(OrderCreatedData {
            order_id: order.id(),
            total: order.total(),
            item_count: order.items().len(),
            created_at: order.record().created_at,
        }))
        .await;
        Ok(order)
    }

    pub async fn add_items(&self, cmd: AddItems) -> Result<Order, FulfillmentError> {
        let (order, added) = self.orders.add_items(cmd).await?;
        self.publish(FulfillmentEvent::ItemsAdded(ItemsAddedData {
            order_id: order.id(),
            added: added.len(),
            total: order.total(),
        }))
        .await;
        Ok(order)
    }

    /// Moves an order to `target`, then prints and announces the change.
    pub async fn transition_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: UserId,
        options: TransitionOptions,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        let mut outcome = self
            .machine
            .transition(order_id, target, actor, options)
            .await?;

        if outcome.ticket == Some(TicketDispatch::Staged) {
            outcome.ticket = Some(self.dispatch_ticket(&outcome.order).await);
        }
        if outcome.changed {
            self.publish(FulfillmentEvent::OrderStatusChanged(StatusChangedData {
                order_id,
                from: outcome.previous,
                to: outcome.order.status(),
                forced: outcome.forced,
                changed_at: outcome.order.record().updated_at,
            }))
            .await;
        }
        Ok(outcome)
    }

    /// Accepts the payment collaborator's "fully paid" signal.
    pub async fn settle_payment(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        self.transition_status(order_id, OrderStatus::Paid, actor, TransitionOptions::default())
            .await
    }

    pub async fn get_order_detail(&self, order_id: OrderId) -> Result<OrderDetail, FulfillmentError> {
        let order = self.orders.load(order_id).await?;
        let markers = self.store.markers(order_id).await?;
        let movements = self.store.movements_for_order(order_id).await?;
        Ok(OrderDetail {
            order,
            markers,
            movements,
        })
    }

    /// Orders the kitchen display shows, oldest first.
    pub async fn list_kitchen_orders(&self) -> Result<Vec<Order>, FulfillmentError> {
        let records = self
            .store
            .orders_with_status(&OrderStatus::KITCHEN, None)
            .await?;
        let mut orders = Vec::with_capacity(records.len());
        for record in records {
            let items = self.store.order_items(record.id).await?;
            orders.push(Order::from_records(record, items));
        }
        Ok(orders)
    }

    pub async fn reconcile(
        &self,
        options: ReconciliationOptions,
        actor: UserId,
    ) -> Result<ReconciliationReport, FulfillmentError> {
        let report = self.reconciliation.run(options, actor).await?;
        self.publish(FulfillmentEvent::ReconciliationCompleted(ReconciliationData {
            scanned: report.scanned,
            processed: report.processed,
            skipped: report.skipped,
            errored: report.errored,
            dry_run: report.dry_run,
        }))
        .await;
        Ok(report)
    }

    /// Prints the ticket again and records a repeat marker.
    ///
    /// The printer runs before any unit of work is opened. A printer failure
    /// is returned and nothing is recorded.
    #[tracing::instrument(skip(self))]
    pub async fn reprint_ticket(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<ReprintOutcome, FulfillmentError> {
        let order = self.orders.load(order_id).await?;
        let receipt = match self.printer.render_and_print(&order, true).await {
            Ok(receipt) => receipt,
            Err(err) => {
                let reason = err.to_string();
                self.report_print_failure(order_id, true, &reason).await;
                return Err(FulfillmentError::SideEffectFailed {
                    kind: SideEffectKind::PrintTicket,
                    reason,
                });
            }
        };

        let mut uow = self.store.begin().await?;
        let order = lock_order(uow.as_mut(), order_id).await?;
        let ctx = EffectContext::new(&order, actor, Utc::now());
        let ticket = KitchenTicket::printed(receipt);
        let outcome = SideEffectCoordinator::ensure_repeatable(uow.as_mut(), &ticket, &ctx).await?;
        uow.commit().await?;

        let marker = outcome.marker().clone();
        let receipt = outcome.into_output().flatten().unwrap_or_default();
        Ok(ReprintOutcome { marker, receipt })
    }

    /// Deducts the order's recipe again on operator request.
    ///
    /// Always runs, whatever markers exist, and records a repeat marker.
    #[tracing::instrument(skip(self))]
    pub async fn manual_deduction(
        &self,
        order_id: OrderId,
        actor: UserId,
        force: bool,
    ) -> Result<DeductionOutcome, FulfillmentError> {
        let mut uow = self.store.begin().await?;
        let order = lock_order(uow.as_mut(), order_id).await?;
        let ctx = EffectContext::new(&order, actor, Utc::now());

        let outcome = SideEffectCoordinator::ensure_repeatable(
            uow.as_mut(),
            &InventoryDeduction::manual(force),
            &ctx,
        )
        .await?;
        uow.commit().await?;

        let marker = outcome.marker().clone();
        let ledger = outcome.into_output().unwrap_or_default();
        Ok(DeductionOutcome {
            marker,
            movements: ledger.movements,
            clamped: ledger.clamped,
        })
    }

    /// Books an operator movement through the ledger. Entries are purchases,
    /// exits and adjustments are manual; none may drive a balance negative.
    #[tracing::instrument(skip(self, input), fields(item_id = %input.inventory_item_id))]
    pub async fn record_stock_movement(
        &self,
        input: StockMovementInput,
        actor: UserId,
    ) -> Result<MovementRecord, FulfillmentError> {
        let item_id = input.inventory_item_id;
        let request = match input.kind {
            MovementKind::Entry => {
                MovementRequest::entry(item_id, input.quantity, MovementOrigin::Purchase)
            }
            MovementKind::Exit => {
                MovementRequest::exit(item_id, input.quantity, MovementOrigin::Manual)
            }
            MovementKind::Adjustment => {
                MovementRequest::adjustment(item_id, input.quantity, MovementOrigin::Manual)
            }
        }
        .with_reason(input.reason)
        .by(actor);

        let mut uow = self.store.begin().await?;
        let outcome = InventoryLedger::apply_movements(
            uow.as_mut(),
            vec![request],
            StockPolicy::Strict,
            Utc::now(),
        )
        .await?;
        uow.commit().await?;

        let movement = outcome
            .movements
            .into_iter()
            .next()
            .ok_or_else(|| FulfillmentError::InvalidMovement("no movement recorded".to_string()))?;
        let balance = self
            .store
            .inventory_item(item_id)
            .await?
            .map(|i| i.quantity)
            .unwrap_or_default();
        self.publish(FulfillmentEvent::StockMovementRecorded(StockMovementData {
            movement_id: movement.id,
            inventory_item_id: item_id,
            quantity: movement.quantity,
            balance,
        }))
        .await;
        Ok(movement)
    }

    /// Compares the order's aggregated requirement with current balances.
    pub async fn stock_availability(
        &self,
        order_id: OrderId,
    ) -> Result<StockAvailability, FulfillmentError> {
        let order = self.orders.load(order_id).await?;
        let product_ids: Vec<_> = order.items().iter().map(|i| i.product_id).collect();
        let book = RecipeBook::load(self.store.as_ref(), product_ids).await?;
        let consumption = book.order_consumption(order.items())?;

        let mut items = Vec::with_capacity(consumption.requirements.len());
        for id in consumption.requirements.keys() {
            if let Some(item) = self.store.inventory_item(*id).await? {
                items.push(item);
            }
        }

        let ingredients = consumption
            .requirements
            .iter()
            .map(|(id, required)| {
                let item = items.iter().find(|i| i.id == *id);
                IngredientAvailability {
                    inventory_item_id: *id,
                    item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
                    unit: item.map(|i| i.unit.clone()).unwrap_or_default(),
                    required: *required,
                    available: item.map_or(Decimal::ZERO, |i| i.quantity),
                }
            })
            .collect();

        Ok(StockAvailability {
            order_id,
            ingredients,
            shortfalls: shortfalls(&items, &consumption.requirements),
        })
    }

    /// Recomputes every balance from the movement history.
    pub async fn verify_inventory(&self) -> Result<Vec<BalanceCheck>, FulfillmentError> {
        Ok(InventoryLedger::verify_all(self.store.as_ref()).await?)
    }

    /// Creates a stock item, booking any initial quantity as a purchase.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add_inventory_item(
        &self,
        input: NewInventoryItem,
        actor: UserId,
    ) -> Result<InventoryItemRecord, FulfillmentError> {
        let now = Utc::now();
        let mut item = InventoryItemRecord {
            id: InventoryItemId::new(),
            name: input.name,
            category: input.category,
            unit: input.unit,
            quantity: Decimal::ZERO,
            min_stock: input.min_stock,
            max_stock: input.max_stock,
            unit_cost: input.unit_cost,
            supplier: input.supplier,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        uow.insert_inventory_item(&item).await?;
        if input.initial_quantity > Decimal::ZERO {
            let entry =
                MovementRequest::entry(item.id, input.initial_quantity, MovementOrigin::Purchase)
                    .with_reason("Initial stock")
                    .by(actor);
            InventoryLedger::apply_movements(uow.as_mut(), vec![entry], StockPolicy::Strict, now)
                .await?;
            item.quantity = input.initial_quantity;
        }
        uow.commit().await?;

        tracing::info!(item_id = %item.id, quantity = %item.quantity, "Inventory item created");
        Ok(item)
    }

    /// Stores a product with its sizes and recipe rules.
    #[tracing::instrument(skip(self, definition), fields(product_id = %definition.product.id))]
    pub async fn register_product(
        &self,
        definition: ProductDefinition,
    ) -> Result<ProductRecord, FulfillmentError> {
        definition.validate()?;

        let mut uow = self.store.begin().await?;
        uow.insert_product(&definition.product).await?;
        for size in &definition.sizes {
            uow.insert_product_size(size).await?;
        }
        for rule in &definition.recipe {
            uow.insert_recipe_rule(rule).await?;
        }
        uow.commit().await?;
        Ok(definition.product)
    }

    async fn dispatch_ticket(&self, order: &Order) -> TicketDispatch {
        match self.printer.render_and_print(order, false).await {
            Ok(receipt) => TicketDispatch::Printed {
                rendered_path: receipt.rendered_path,
            },
            Err(err) => {
                let reason = err.to_string();
                self.report_print_failure(order.id(), false, &reason).await;
                TicketDispatch::Failed { reason }
            }
        }
    }

    async fn report_print_failure(&self, order_id: OrderId, reprint: bool, reason: &str) {
        metrics::counter!("ticket_print_failures_total").increment(1);
        tracing::error!(%order_id, reprint, reason, "Kitchen ticket failed to print");
        self.publish(FulfillmentEvent::TicketPrintFailed(TicketPrintFailedData {
            order_id,
            reprint,
            reason: reason.to_string(),
        }))
        .await;
    }

    async fn publish(&self, event: FulfillmentEvent) {
        if let Err(err) = self.notifier.publish(&event).await {
            metrics::counter!("notification_failures_total").increment(1);
            tracing::warn!(event = event.event_type(), error = %err, "Notification failed");
        }
    }
}

impl<S, P, N> Clone for FulfillmentService<S, P, N>
where
    S: FulfillmentStore,
    P: TicketPrinter,
    N: Notifier,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            orders: self.orders.clone(),
            machine: self.machine.clone(),
            reconciliation: self.reconciliation.clone(),
            printer: self.printer.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
