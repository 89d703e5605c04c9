//! Value objects for the order domain.

use common::{ItemCustomization, Money, OrderStatus, ProductId, SizeId};
use serde::{Deserialize, Serialize};
use store::ItemModifierRecord;

use super::OrderError;

/// Tax and suggested-tip rates, in basis points of the discounted subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate_bps: u32,
    pub suggested_tip_bps: u32,
}

impl PricingPolicy {
    pub fn new(tax_rate_bps: u32, suggested_tip_bps: u32) -> Self {
        Self {
            tax_rate_bps,
            suggested_tip_bps,
        }
    }
}

/// The monetary fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub suggested_tip: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes totals from line totals: `total = subtotal - discount + tax`.
    pub fn compute(
        line_totals: impl IntoIterator<Item = Money>,
        discount: Money,
        policy: &PricingPolicy,
    ) -> Result<Self, OrderError> {
        let subtotal =
            Money::checked_sum(line_totals).ok_or(OrderError::AmountOverflow("subtotal"))?;
        if discount.is_negative() || discount > subtotal {
            return Err(OrderError::InvalidDiscount {
                discount: discount.cents(),
                subtotal: subtotal.cents(),
            });
        }

        let taxable = subtotal
            .checked_sub(discount)
            .ok_or(OrderError::AmountOverflow("subtotal"))?;
        let tax = taxable
            .apply_basis_points(policy.tax_rate_bps)
            .ok_or(OrderError::AmountOverflow("tax"))?;
        let suggested_tip = taxable
            .apply_basis_points(policy.suggested_tip_bps)
            .ok_or(OrderError::AmountOverflow("suggested tip"))?;
        let total = taxable
            .checked_add(tax)
            .ok_or(OrderError::AmountOverflow("total"))?;
        Ok(Self {
            subtotal,
            discount,
            tax,
            suggested_tip,
            total,
        })
    }
}

/// An order line priced against the catalog.
///
/// Product name and size label are the catalog values at pricing time and
/// are stored on the line as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedItem {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub product_name: String,
    pub size_label: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub note: Option<String>,
    pub customization: ItemCustomization,
    pub modifiers: Vec<ItemModifierRecord>,
}

impl PricedItem {
    /// Unit price plus modifiers, times quantity.
    pub fn line_total(&self) -> Result<Money, OrderError> {
        if let Some(modifier) = self.modifiers.iter().find(|m| m.unit_price.is_negative()) {
            return Err(OrderError::InvalidModifierPrice {
                name: modifier.name.clone(),
                price: modifier.unit_price.cents(),
            });
        }
        Money::checked_sum(self.modifiers.iter().map(|m| m.unit_price))
            .and_then(|modifiers| self.unit_price.checked_add(modifiers))
            .and_then(|unit| unit.checked_mul(self.quantity))
            .ok_or(OrderError::AmountOverflow("line total"))
    }
}

/// Outcome of planning a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The order already has the requested status; nothing to do.
    Unchanged(OrderStatus),

    /// A legal edge of the status graph.
    Move { from: OrderStatus, to: OrderStatus },
}

impl TransitionPlan {
    /// The status the order has once the plan is applied.
    pub fn target(&self) -> OrderStatus {
        match self {
            TransitionPlan::Unchanged(status) => *status,
            TransitionPlan::Move { to, .. } => *to,
        }
    }

    /// True when the plan moves the order into `ready`.
    pub fn enters_ready(&self) -> bool {
        matches!(
            self,
            TransitionPlan::Move {
                to: OrderStatus::Ready,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ModifierOptionId;

    #[test]
    fn totals_apply_discount_before_tax_and_tip() {
        let policy = PricingPolicy::new(1600, 1000);
        let totals = OrderTotals::compute(
            [Money::from_cents(1000), Money::from_cents(500)],
            Money::from_cents(500),
            &policy,
        )
        .unwrap();

        assert_eq!(totals.subtotal, Money::from_cents(1500));
        assert_eq!(totals.tax, Money::from_cents(160));
        assert_eq!(totals.suggested_tip, Money::from_cents(100));
        assert_eq!(totals.total, Money::from_cents(1160));
    }

    #[test]
    fn discount_larger_than_subtotal_is_rejected() {
        let result = OrderTotals::compute(
            [Money::from_cents(100)],
            Money::from_cents(101),
            &PricingPolicy::default(),
        );
        assert!(matches!(result, Err(OrderError::InvalidDiscount { .. })));
    }

    fn burger(quantity: u32, modifier_cents: i64) -> PricedItem {
        PricedItem {
            product_id: ProductId::new(),
            size_id: None,
            product_name: "Burger".to_string(),
            size_label: None,
            quantity,
            unit_price: Money::from_cents(800),
            note: None,
            customization: ItemCustomization::default(),
            modifiers: vec![ItemModifierRecord {
                option_id: ModifierOptionId::new(),
                name: "Bacon".to_string(),
                unit_price: Money::from_cents(modifier_cents),
            }],
        }
    }

    #[test]
    fn line_total_includes_modifiers() {
        assert_eq!(burger(3, 150).line_total().unwrap(), Money::from_cents(2850));
        assert_eq!(burger(1, 0).line_total().unwrap(), Money::from_cents(800));
    }

    #[test]
    fn negative_modifier_price_is_rejected() {
        let result = burger(1, -500).line_total();
        assert!(matches!(
            result,
            Err(OrderError::InvalidModifierPrice { price: -500, .. })
        ));
    }

    #[test]
    fn oversized_modifier_price_overflows_cleanly() {
        let result = burger(2, i64::MAX).line_total();
        assert!(matches!(result, Err(OrderError::AmountOverflow(_))));
    }

    #[test]
    fn totals_overflow_is_an_error() {
        let result = OrderTotals::compute(
            [Money::from_cents(i64::MAX), Money::from_cents(1)],
            Money::zero(),
            &PricingPolicy::default(),
        );
        assert!(matches!(result, Err(OrderError::AmountOverflow("subtotal"))));
    }

    #[test]
    fn plan_reports_ready_entry() {
        let plan = TransitionPlan::Move {
            from: OrderStatus::Preparing,
            to: OrderStatus::Ready,
        };
        assert!(plan.enters_ready());
        assert!(!TransitionPlan::Unchanged(OrderStatus::Ready).enters_ready());
        assert_eq!(plan.target(), OrderStatus::Ready);
    }
}
