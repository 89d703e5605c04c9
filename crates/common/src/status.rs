//! Order status catalog and its transition graph.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► SentToKitchen ──► Preparing ──► Ready ──┬──────────────────────► Paid
///    │              │               │           │     └──► ReadyForPickup ──► Paid
///    └──────────────┴───────────────┴───────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order has been taken, items may still be added.
    #[default]
    Created,

    /// Order was sent to the kitchen.
    SentToKitchen,

    /// Kitchen is preparing the order.
    Preparing,

    /// Food is ready; ingredients are deducted and the ticket printed on entry.
    Ready,

    /// Takeout order waiting at the counter.
    ReadyForPickup,

    /// Fully paid (terminal state).
    Paid,

    /// Order was cancelled (terminal state).
    Cancelled,
}

/// Legal edges of the status graph, indexed by source status.
const TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (
        OrderStatus::Created,
        &[OrderStatus::SentToKitchen, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::SentToKitchen,
        &[OrderStatus::Preparing, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Preparing,
        &[OrderStatus::Ready, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Ready,
        &[
            OrderStatus::ReadyForPickup,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
        ],
    ),
    (
        OrderStatus::ReadyForPickup,
        &[OrderStatus::Paid, OrderStatus::Cancelled],
    ),
    (OrderStatus::Paid, &[]),
    (OrderStatus::Cancelled, &[]),
];

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::SentToKitchen,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::ReadyForPickup,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
    ];

    /// Statuses the kitchen display shows.
    pub const KITCHEN: [OrderStatus; 3] = [
        OrderStatus::SentToKitchen,
        OrderStatus::Preparing,
        OrderStatus::Ready,
    ];

    /// Statuses that imply the inventory deduction already happened.
    pub const DEDUCTED: [OrderStatus; 2] = [OrderStatus::Ready, OrderStatus::ReadyForPickup];

    /// Returns the statuses reachable in one step from this one.
    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    /// Returns true if `target` is a legal edge from this status.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Returns true if items can still be added in this status.
    pub fn accepts_items(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::SentToKitchen | OrderStatus::Preparing
        )
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::SentToKitchen => "sent_to_kitchen",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown order status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
