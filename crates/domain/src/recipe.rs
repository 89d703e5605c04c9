//! Recipe resolution: what an order line consumes from inventory.
//!
//! Resolution is a pure function of the recipe rules and the product record,
//! so it can run against rows read through a unit of work or through the
//! lock-free store reads alike.

use std::collections::{BTreeMap, HashMap};

use common::{InventoryItemId, ItemCustomization, OrderItemId, ProductId, RecipeRuleId, SizeId};
use rust_decimal::Decimal;
use serde::Serialize;
use store::{
    FulfillmentStore, OrderItemRecord, ProductRecord, RecipeRuleRecord, StoreError, UnitOfWork,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    /// Neither a product record nor any recipe rule exists.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error("Invalid customization factor {factor} for ingredient {inventory_item_id}")]
    InvalidFactor {
        inventory_item_id: InventoryItemId,
        factor: Decimal,
    },
}

/// One ingredient consumed by an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumptionLine {
    pub rule_id: RecipeRuleId,
    pub inventory_item_id: InventoryItemId,
    pub quantity: Decimal,
    /// Lines that are not auto-deducted are informational only.
    pub auto_deduct: bool,
}

/// Resolves the consumption of `quantity_sold` units of a product.
///
/// Size-scoped rules override the size-agnostic rule for the same ingredient;
/// rules scoped to a different size are ignored. A customization factor
/// applies only to customizable rules and an opt-out only to optional ones.
/// A product with no rules resolves to an empty list.
pub fn resolve_consumption(
    product_id: ProductId,
    product: Option<&ProductRecord>,
    rules: &[RecipeRuleRecord],
    size_id: Option<SizeId>,
    quantity_sold: u32,
    customization: &ItemCustomization,
) -> Result<Vec<ConsumptionLine>, RecipeError> {
    if product.is_none() && rules.is_empty() {
        return Err(RecipeError::UnknownProduct(product_id));
    }

    let sized: Vec<InventoryItemId> = rules
        .iter()
        .filter(|r| r.size_id.is_some() && r.size_id == size_id)
        .map(|r| r.inventory_item_id)
        .collect();

    let mut lines = Vec::new();
    for rule in rules.iter().filter(|r| r.product_id == product_id) {
        let applies = match rule.size_id {
            Some(scope) => Some(scope) == size_id,
            None => !sized.contains(&rule.inventory_item_id),
        };
        if !applies {
            continue;
        }
        if rule.optional && customization.skipped.contains(&rule.inventory_item_id) {
            continue;
        }

        let mut quantity = rule.quantity_per_unit * Decimal::from(quantity_sold);
        if rule.customizable
            && let Some(factor) = customization.factors.get(&rule.inventory_item_id)
        {
            if factor.is_sign_negative() {
                return Err(RecipeError::InvalidFactor {
                    inventory_item_id: rule.inventory_item_id,
                    factor: *factor,
                });
            }
            quantity *= *factor;
        }

        lines.push(ConsumptionLine {
            rule_id: rule.id,
            inventory_item_id: rule.inventory_item_id,
            quantity,
            auto_deduct: rule.auto_deduct,
        });
    }
    Ok(lines)
}

/// Sums auto-deducted consumption per inventory item. Zero amounts are dropped.
pub fn aggregate_requirements<'a>(
    lines: impl IntoIterator<Item = &'a ConsumptionLine>,
) -> BTreeMap<InventoryItemId, Decimal> {
    let mut totals: BTreeMap<InventoryItemId, Decimal> = BTreeMap::new();
    for line in lines.into_iter().filter(|l| l.auto_deduct) {
        *totals.entry(line.inventory_item_id).or_default() += line.quantity;
    }
    totals.retain(|_, quantity| !quantity.is_zero());
    totals
}

/// Consumption of a whole order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderConsumption {
    pub lines: Vec<(OrderItemId, Vec<ConsumptionLine>)>,
    /// Aggregated auto-deduct requirement per inventory item.
    pub requirements: BTreeMap<InventoryItemId, Decimal>,
}

/// Products and recipe rules preloaded for a set of order lines.
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    entries: HashMap<ProductId, (Option<ProductRecord>, Vec<RecipeRuleRecord>)>,
}

impl RecipeBook {
    /// Loads recipes through a unit of work.
    pub async fn load_in(
        uow: &mut dyn UnitOfWork,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<Self, StoreError> {
        let mut book = RecipeBook::default();
        for product_id in product_ids {
            if book.entries.contains_key(&product_id) {
                continue;
            }
            let product = uow.product(product_id).await?;
            let rules = uow.recipe_rules(product_id).await?;
            book.insert(product_id, product, rules);
        }
        Ok(book)
    }

    /// Loads recipes with lock-free reads.
    pub async fn load<S: FulfillmentStore + ?Sized>(
        store: &S,
        product_ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<Self, StoreError> {
        let mut book = RecipeBook::default();
        for product_id in product_ids {
            if book.entries.contains_key(&product_id) {
                continue;
            }
            let product = store.product(product_id).await?;
            let rules = store.recipe_rules(product_id).await?;
            book.insert(product_id, product, rules);
        }
        Ok(book)
    }

    pub fn insert(
        &mut self,
        product_id: ProductId,
        product: Option<ProductRecord>,
        rules: Vec<RecipeRuleRecord>,
    ) {
        self.entries.insert(product_id, (product, rules));
    }

    /// Resolves one order line.
    pub fn resolve(&self, item: &OrderItemRecord) -> Result<Vec<ConsumptionLine>, RecipeError> {
        let (product, rules) = self
            .entries
            .get(&item.product_id)
            .map(|(p, r)| (p.as_ref(), r.as_slice()))
            .unwrap_or((None, &[][..]));
        resolve_consumption(
            item.product_id,
            product,
            rules,
            item.size_id,
            item.quantity,
            &item.customization,
        )
    }

    /// Resolves every line of an order and aggregates the requirement.
    pub fn order_consumption(
        &self,
        items: &[OrderItemRecord],
    ) -> Result<OrderConsumption, RecipeError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            lines.push((item.id, self.resolve(item)?));
        }
        let requirements = aggregate_requirements(lines.iter().flat_map(|(_, l)| l));
        Ok(OrderConsumption {
            lines,
            requirements,
        })
    }
}
