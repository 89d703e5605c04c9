//! Row shapes persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    CustomerId, InventoryItemId, ItemCustomization, MarkerId, ModifierOptionId, Money,
    MovementId, MovementKind, MovementOrigin, OrderId, OrderItemId, OrderStatus, ProductId,
    RecipeRuleId, SideEffectKind, SizeId, TableId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Optional customer details attached to an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub customer_id: Option<CustomerId>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// An order header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub table_id: Option<TableId>,
    pub customer: CustomerInfo,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub suggested_tip: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_prep_minutes: Option<u32>,
    pub pickup_at: Option<DateTime<Utc>>,
}

/// A modifier chosen for an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemModifierRecord {
    pub option_id: ModifierOptionId,
    pub name: String,
    pub unit_price: Money,
}

/// An order line. Product name and size label are captured when the line is
/// created and never refreshed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub position: u32,
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub product_name: String,
    pub size_label: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub note: Option<String>,
    pub customization: ItemCustomization,
    pub modifiers: Vec<ItemModifierRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub base_price: Money,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSizeRecord {
    pub id: SizeId,
    pub product_id: ProductId,
    pub label: String,
    pub price: Money,
}

/// Links a product (optionally one of its sizes) to an inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRuleRecord {
    pub id: RecipeRuleId,
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub inventory_item_id: InventoryItemId,
    pub quantity_per_unit: Decimal,
    pub auto_deduct: bool,
    pub customizable: bool,
    pub optional: bool,
}

/// A stock item with its materialized, ledger-derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemRecord {
    pub id: InventoryItemId,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub quantity: Decimal,
    pub min_stock: Decimal,
    pub max_stock: Option<Decimal>,
    pub unit_cost: Money,
    pub supplier: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable ledger entry. `quantity` is the signed effect on the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub inventory_item_id: InventoryItemId,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub unit_cost: Money,
    pub reason: String,
    pub origin: MovementOrigin,
    pub order_id: Option<OrderId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Durable proof that a side effect ran for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: MarkerId,
    pub order_id: OrderId,
    pub kind: SideEffectKind,
    pub is_repeat: bool,
    pub forced: bool,
    pub performed_by: UserId,
    pub performed_at: DateTime<Utc>,
    pub detail: serde_json::Value,
}
