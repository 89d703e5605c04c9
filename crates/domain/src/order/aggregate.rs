//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, OrderStatus};
use serde::{Deserialize, Serialize};
use store::{OrderItemRecord, OrderRecord};

use super::{CreateOrder, OrderError, OrderTotals, PricedItem, PricingPolicy, TransitionPlan};

/// Order aggregate root.
///
/// Wraps the persisted header and its lines. Totals are computed once at
/// creation and recomputed only when lines are appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    record: OrderRecord,
    items: Vec<OrderItemRecord>,
}

// Query methods
impl Order {
    /// Rebuilds an order from stored rows.
    pub fn from_records(record: OrderRecord, mut items: Vec<OrderItemRecord>) -> Self {
        items.sort_by_key(|i| i.position);
        Self { record, items }
    }

    pub fn id(&self) -> OrderId {
        self.record.id
    }

    pub fn status(&self) -> OrderStatus {
        self.record.status
    }

    pub fn record(&self) -> &OrderRecord {
        &self.record
    }

    /// Lines in position order.
    pub fn items(&self) -> &[OrderItemRecord] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.record.total
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn into_parts(self) -> (OrderRecord, Vec<OrderItemRecord>) {
        (self.record, self.items)
    }
}

// Command methods
impl Order {
    /// Creates a new order in `created` status.
    pub fn create(
        cmd: &CreateOrder,
        items: Vec<PricedItem>,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let mut order = Order {
            record: OrderRecord {
                id: cmd.order_id,
                table_id: cmd.table_id,
                customer: cmd.customer.clone(),
                subtotal: Money::zero(),
                discount: cmd.discount,
                tax: Money::zero(),
                suggested_tip: Money::zero(),
                total: Money::zero(),
                status: OrderStatus::Created,
                created_by: cmd.created_by,
                created_at: now,
                updated_at: now,
                estimated_prep_minutes: cmd.estimated_prep_minutes,
                pickup_at: None,
            },
            items: Vec::new(),
        };
        order.append(items, policy, now)?;
        Ok(order)
    }

    /// Appends lines and recomputes totals. Returns the new lines.
    pub fn add_items(
        &mut self,
        items: Vec<PricedItem>,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderItemRecord>, OrderError> {
        if !self.record.status.accepts_items() {
            return Err(OrderError::ItemsLocked {
                status: self.record.status,
            });
        }
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        self.append(items, policy, now)
    }

    fn append(
        &mut self,
        items: Vec<PricedItem>,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderItemRecord>, OrderError> {
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    price: item.unit_price.cents(),
                });
            }
        }

        let first_position = self.items.last().map_or(0, |i| i.position + 1);
        let added: Vec<OrderItemRecord> = items
            .into_iter()
            .zip(first_position..)
            .map(|(item, position)| {
                Ok(OrderItemRecord {
                    id: OrderItemId::new(),
                    order_id: self.record.id,
                    position,
                    line_total: item.line_total()?,
                    product_id: item.product_id,
                    size_id: item.size_id,
                    product_name: item.product_name,
                    size_label: item.size_label,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    note: item.note,
                    customization: item.customization,
                    modifiers: item.modifiers,
                })
            })
            .collect::<Result<_, OrderError>>()?;

        let totals = OrderTotals::compute(
            self.items.iter().chain(&added).map(|i| i.line_total),
            self.record.discount,
            policy,
        )?;

        self.record.subtotal = totals.subtotal;
        self.record.tax = totals.tax;
        self.record.suggested_tip = totals.suggested_tip;
        self.record.total = totals.total;
        self.record.updated_at = now;
        self.items.extend(added.iter().cloned());
        Ok(added)
    }

    /// Validates a status change against the transition table.
    ///
    /// Requesting the current status is a successful no-op, even for
    /// terminal statuses, so client retries are harmless.
    pub fn plan_transition(&self, target: OrderStatus) -> Result<TransitionPlan, OrderError> {
        let current = self.record.status;
        if current == target {
            return Ok(TransitionPlan::Unchanged(current));
        }
        if !current.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                current,
                requested: target,
            });
        }
        if target == OrderStatus::SentToKitchen && self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        Ok(TransitionPlan::Move {
            from: current,
            to: target,
        })
    }

    /// Applies a plan produced by [`Order::plan_transition`].
    pub fn apply_transition(&mut self, plan: TransitionPlan, now: DateTime<Utc>) {
        if let TransitionPlan::Move { to, .. } = plan {
            self.record.status = to;
            self.record.updated_at = now;
            if to == OrderStatus::ReadyForPickup && self.record.pickup_at.is_none() {
                self.record.pickup_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ItemCustomization, ProductId, UserId};

    fn priced(name: &str, quantity: u32, cents: i64) -> PricedItem {
        PricedItem {
            product_id: ProductId::new(),
            size_id: None,
            product_name: name.to_string(),
            size_label: None,
            quantity,
            unit_price: Money::from_cents(cents),
            note: None,
            customization: ItemCustomization::default(),
            modifiers: Vec::new(),
        }
    }

    fn create_order(items: Vec<PricedItem>) -> Order {
        let cmd = CreateOrder::new(UserId::new());
        Order::create(&cmd, items, &PricingPolicy::new(1000, 1500), Utc::now()).unwrap()
    }

    fn at_status(status: OrderStatus) -> Order {
        let mut order = create_order(vec![priced("Taco", 1, 300)]);
        order.record.status = status;
        order
    }

    #[test]
    fn test_create_order() {
        let order = create_order(vec![priced("Taco", 2, 300), priced("Soda", 1, 200)]);

        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.record().subtotal, Money::from_cents(800));
        assert_eq!(order.record().tax, Money::from_cents(80));
        assert_eq!(order.record().suggested_tip, Money::from_cents(120));
        assert_eq!(order.total(), Money::from_cents(880));
        assert_eq!(order.total_quantity(), 3);
        assert_eq!(
            order.items().iter().map(|i| i.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_add_items_recomputes_totals_and_positions() {
        let mut order = create_order(vec![priced("Taco", 1, 300)]);

        let added = order
            .add_items(vec![priced("Soda", 2, 200)], &PricingPolicy::default(), Utc::now())
            .unwrap();

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].position, 1);
        assert_eq!(added[0].line_total, Money::from_cents(400));
        assert_eq!(order.total(), Money::from_cents(700));
    }

    #[test]
    fn test_add_item_zero_quantity_fails() {
        let mut order = create_order(vec![]);
        let result = order.add_items(vec![priced("Taco", 0, 300)], &PricingPolicy::default(), Utc::now());
        assert!(matches!(result, Err(OrderError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_add_item_zero_price_fails() {
        let mut order = create_order(vec![]);
        let result = order.add_items(vec![priced("Water", 1, 0)], &PricingPolicy::default(), Utc::now());
        assert!(matches!(result, Err(OrderError::InvalidPrice { .. })));
    }

    #[test]
    fn test_add_items_after_ready_fails() {
        let mut order = at_status(OrderStatus::Ready);
        let result = order.add_items(vec![priced("Taco", 1, 300)], &PricingPolicy::default(), Utc::now());
        assert!(matches!(
            result,
            Err(OrderError::ItemsLocked {
                status: OrderStatus::Ready
            })
        ));
    }

    #[test]
    fn test_same_status_is_noop_even_when_terminal() {
        for status in [OrderStatus::Ready, OrderStatus::Paid, OrderStatus::Cancelled] {
            let order = at_status(status);
            assert_eq!(
                order.plan_transition(status).unwrap(),
                TransitionPlan::Unchanged(status)
            );
        }
    }

    #[test]
    fn test_illegal_edge_reports_both_statuses() {
        let order = at_status(OrderStatus::Created);
        match order.plan_transition(OrderStatus::Ready) {
            Err(OrderError::InvalidTransition { current, requested }) => {
                assert_eq!(current, OrderStatus::Created);
                assert_eq!(requested, OrderStatus::Ready);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_states_reject_moves() {
        let order = at_status(OrderStatus::Paid);
        assert!(order.plan_transition(OrderStatus::Cancelled).is_err());
        let order = at_status(OrderStatus::Cancelled);
        assert!(order.plan_transition(OrderStatus::Created).is_err());
    }

    #[test]
    fn test_empty_order_cannot_go_to_kitchen() {
        let order = create_order(vec![]);
        assert!(matches!(
            order.plan_transition(OrderStatus::SentToKitchen),
            Err(OrderError::NoItems)
        ));
    }

    #[test]
    fn test_ready_for_pickup_sets_pickup_time() {
        let mut order = at_status(OrderStatus::Ready);
        let plan = order.plan_transition(OrderStatus::ReadyForPickup).unwrap();
        let now = Utc::now();

        order.apply_transition(plan, now);

        assert_eq!(order.status(), OrderStatus::ReadyForPickup);
        assert_eq!(order.record().pickup_at, Some(now));
    }
}
