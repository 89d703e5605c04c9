//! Recipe-based inventory deduction.

use async_trait::async_trait;
use common::{MovementOrigin, SideEffectKind};
use domain::{InventoryLedger, LedgerOutcome, MovementRequest, RecipeBook, StockPolicy};
use store::UnitOfWork;

use crate::coordinator::{EffectContext, Performed, SideEffect};
use crate::error::FulfillmentError;

/// Deducts every auto-deduct ingredient of an order from stock.
///
/// Requirements are aggregated per inventory item across all lines, so two
/// lines of the same dish produce a single exit movement per ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryDeduction {
    policy: StockPolicy,
    origin: MovementOrigin,
}

impl InventoryDeduction {
    /// Deduction on entry to `ready`. `force` clamps at zero instead of failing.
    pub fn automatic(force: bool) -> Self {
        Self {
            policy: policy_for(force),
            origin: MovementOrigin::AutomaticRecipe,
        }
    }

    /// Backfill of a deduction that never happened.
    pub fn reconciliation() -> Self {
        Self {
            policy: StockPolicy::Strict,
            origin: MovementOrigin::Reconciliation,
        }
    }

    /// Operator-requested re-deduction.
    pub fn manual(force: bool) -> Self {
        Self {
            policy: policy_for(force),
            origin: MovementOrigin::Manual,
        }
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    fn reason(&self, ctx: &EffectContext<'_>) -> String {
        let order_id = ctx.order.id();
        match self.origin {
            MovementOrigin::Reconciliation => format!("Reconciliation backfill for order {order_id}"),
            MovementOrigin::Manual => format!("Manual recipe deduction for order {order_id}"),
            _ => format!("Recipe deduction for order {order_id}"),
        }
    }
}

fn policy_for(force: bool) -> StockPolicy {
    if force {
        StockPolicy::ClampToZero
    } else {
        StockPolicy::Strict
    }
}

#[async_trait]
impl SideEffect for InventoryDeduction {
    type Output = LedgerOutcome;

    fn kind(&self) -> SideEffectKind {
        SideEffectKind::InventoryDeduct
    }

    async fn perform(
        &self,
        uow: &mut dyn UnitOfWork,
        ctx: &EffectContext<'_>,
    ) -> Result<Performed<LedgerOutcome>, FulfillmentError> {
        let items = ctx.order.items();
        let product_ids: Vec<_> = items.iter().map(|i| i.product_id).collect();
        let book = RecipeBook::load_in(uow, product_ids).await?;
        let consumption = book.order_consumption(items)?;

        let reason = self.reason(ctx);
        let batch: Vec<MovementRequest> = consumption
            .requirements
            .iter()
            .map(|(item, quantity)| {
                MovementRequest::exit(*item, *quantity, self.origin)
                    .with_reason(reason.clone())
                    .for_order(ctx.order.id())
                    .by(ctx.actor)
            })
            .collect();

        let outcome = InventoryLedger::apply_movements(uow, batch, self.policy, ctx.now).await?;
        if outcome.forced() {
            tracing::warn!(
                order_id = %ctx.order.id(),
                clamped = outcome.clamped.len(),
                "Forced deduction removed less than the recipe requires"
            );
        }

        let detail = serde_json::json!({
            "origin": self.origin.as_str(),
            "ingredients": consumption.requirements.len(),
            "movements": outcome.movements.len(),
            "clamped": outcome.clamped.len(),
        });
        let forced = outcome.forced();
        Ok(Performed::new(outcome).forced(forced).with_detail(detail))
    }
}
