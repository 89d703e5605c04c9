//! The order state machine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, OrderStatus, UserId};
use domain::{Order, TransitionPlan, lock_order};
use serde::Serialize;
use store::{FulfillmentStore, MovementRecord};

use crate::coordinator::{EffectContext, SideEffectCoordinator};
use crate::effects::{InventoryDeduction, KitchenTicket};
use crate::error::FulfillmentError;

/// Options for a status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionOptions {
    /// On entry to `ready`, deduct what is on hand instead of failing on a
    /// shortfall.
    pub force: bool,
}

impl TransitionOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// What happened to the kitchen ticket during a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TicketDispatch {
    /// The marker is committed; the ticket still has to reach the printer.
    Staged,
    Printed { rendered_path: Option<PathBuf> },
    /// The marker is committed but the printer failed. Reprint manually.
    Failed { reason: String },
}

/// Result of a status change.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub previous: OrderStatus,
    /// False when the order already had the requested status.
    pub changed: bool,
    /// Movements created by the deduction on entry to `ready`.
    pub movements: Vec<MovementRecord>,
    /// The deduction clamped at least one ingredient at zero.
    pub forced: bool,
    /// Set when this transition recorded the automatic print marker.
    pub ticket: Option<TicketDispatch>,
}

/// Validates status changes and runs the side effects of entering `ready`.
pub struct OrderStateMachine<S: FulfillmentStore> {
    store: Arc<S>,
}

impl<S: FulfillmentStore> OrderStateMachine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Moves an order to `target` in one unit of work.
    ///
    /// Requesting the current status is a no-op success. On entry to `ready`
    /// the inventory deduction runs first and the print marker second, both
    /// through the coordinator; any failure rolls the whole transition back.
    /// The ticket itself is only staged and must be dispatched by the caller
    /// after this returns.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: UserId,
        options: TransitionOptions,
    ) -> Result<TransitionOutcome, FulfillmentError> {
        let started = Instant::now();
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let mut order = lock_order(uow.as_mut(), order_id).await?;
        let previous = order.status();
        let plan = order.plan_transition(target)?;

        if let TransitionPlan::Unchanged(status) = plan {
            tracing::debug!(%status, "Order already in requested status");
            return Ok(TransitionOutcome {
                order,
                previous,
                changed: false,
                movements: Vec::new(),
                forced: false,
                ticket: None,
            });
        }

        let mut movements = Vec::new();
        let mut forced = false;
        let mut ticket = None;
        if plan.enters_ready() {
            let ctx = EffectContext::new(&order, actor, now);

            let deduction = InventoryDeduction::automatic(options.force);
            let deducted =
                SideEffectCoordinator::ensure_once(uow.as_mut(), &deduction, &ctx).await?;
            if let Some(outcome) = deducted.into_output() {
                forced = outcome.forced();
                movements = outcome.movements;
            }

            let printed =
                SideEffectCoordinator::ensure_once(uow.as_mut(), &KitchenTicket::staged(), &ctx)
                    .await?;
            if printed.was_performed() {
                ticket = Some(TicketDispatch::Staged);
            }
        }

        order.apply_transition(plan, now);
        uow.update_order(order.record()).await?;
        uow.commit().await?;

        metrics::counter!("order_transitions_total", "to" => target.as_str()).increment(1);
        metrics::histogram!("order_transition_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if forced {
            tracing::warn!(
                from = %previous,
                movements = movements.len(),
                "Order marked ready with forced deduction"
            );
        } else {
            tracing::info!(from = %previous, movements = movements.len(), "Order status changed");
        }

        Ok(TransitionOutcome {
            order,
            previous,
            changed: true,
            movements,
            forced,
            ticket,
        })
    }
}

impl<S: FulfillmentStore> Clone for OrderStateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}
