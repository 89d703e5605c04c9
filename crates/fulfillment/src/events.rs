//! Facts published to the real-time collaborator.

use chrono::{DateTime, Utc};
use common::{InventoryItemId, Money, MovementId, OrderId, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Events published after a change has been committed.
///
/// Delivery is best effort, at least once and unordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FulfillmentEvent {
    OrderCreated(OrderCreatedData),

    ItemsAdded(ItemsAddedData),

    OrderStatusChanged(StatusChangedData),

    /// A ticket could not be printed after its marker was recorded.
    TicketPrintFailed(TicketPrintFailedData),

    StockMovementRecorded(StockMovementData),

    ReconciliationCompleted(ReconciliationData),
}

impl FulfillmentEvent {
    /// Returns the event kind used as the publication channel name.
    pub fn event_type(&self) -> &'static str {
        match self {
            FulfillmentEvent::OrderCreated(_) => "OrderCreated",
            FulfillmentEvent::ItemsAdded(_) => "ItemsAdded",
            FulfillmentEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            FulfillmentEvent::TicketPrintFailed(_) => "TicketPrintFailed",
            FulfillmentEvent::StockMovementRecorded(_) => "StockMovementRecorded",
            FulfillmentEvent::ReconciliationCompleted(_) => "ReconciliationCompleted",
        }
    }

    /// Returns the order the event is about, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            FulfillmentEvent::OrderCreated(d) => Some(d.order_id),
            FulfillmentEvent::ItemsAdded(d) => Some(d.order_id),
            FulfillmentEvent::OrderStatusChanged(d) => Some(d.order_id),
            FulfillmentEvent::TicketPrintFailed(d) => Some(d.order_id),
            FulfillmentEvent::StockMovementRecorded(_)
            | FulfillmentEvent::ReconciliationCompleted(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub total: Money,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsAddedData {
    pub order_id: OrderId,
    pub added: usize,
    pub total: Money,
}

/// Data for OrderStatusChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// The deduction on entry to `ready` bypassed the stock check.
    pub forced: bool,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPrintFailedData {
    pub order_id: OrderId,
    pub reprint: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovementData {
    pub movement_id: MovementId,
    pub inventory_item_id: InventoryItemId,
    /// Signed effect on the balance.
    pub quantity: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationData {
    pub scanned: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let order_id = OrderId::new();
        let event = FulfillmentEvent::OrderStatusChanged(StatusChangedData {
            order_id,
            from: OrderStatus::Preparing,
            to: OrderStatus::Ready,
            forced: false,
            changed_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderStatusChanged");
        assert_eq!(json["data"]["to"], "ready");
        assert_eq!(event.order_id(), Some(order_id));

        let back: FulfillmentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
