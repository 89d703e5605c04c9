//! Order commands.

use common::{ItemCustomization, Money, OrderId, ProductId, SizeId, TableId, UserId};
use serde::{Deserialize, Serialize};
use store::{CustomerInfo, ItemModifierRecord};

/// A requested order line, before catalog pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub size_id: Option<SizeId>,
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub customization: ItemCustomization,
    #[serde(default)]
    pub modifiers: Vec<ItemModifierRecord>,
}

impl NewItem {
    /// Creates a plain line for a product.
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            size_id: None,
            quantity,
            note: None,
            customization: ItemCustomization::default(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_size(mut self, size_id: SizeId) -> Self {
        self.size_id = Some(size_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_customization(mut self, customization: ItemCustomization) -> Self {
        self.customization = customization;
        self
    }

    pub fn with_modifier(mut self, modifier: ItemModifierRecord) -> Self {
        self.modifiers.push(modifier);
        self
    }
}

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order ID to create.
    pub order_id: OrderId,
    pub table_id: Option<TableId>,
    pub customer: CustomerInfo,
    pub discount: Money,
    pub estimated_prep_minutes: Option<u32>,
    pub created_by: UserId,
    pub items: Vec<NewItem>,
}

impl CreateOrder {
    /// Creates a new CreateOrder command with a generated order ID.
    pub fn new(created_by: UserId) -> Self {
        Self {
            order_id: OrderId::new(),
            table_id: None,
            customer: CustomerInfo::default(),
            discount: Money::zero(),
            estimated_prep_minutes: None,
            created_by,
            items: Vec::new(),
        }
    }

    pub fn for_table(mut self, table_id: TableId) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn with_customer(mut self, customer: CustomerInfo) -> Self {
        self.customer = customer;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_estimated_prep(mut self, minutes: u32) -> Self {
        self.estimated_prep_minutes = Some(minutes);
        self
    }

    pub fn with_item(mut self, item: NewItem) -> Self {
        self.items.push(item);
        self
    }
}

/// Command to append lines to an existing order.
#[derive(Debug, Clone)]
pub struct AddItems {
    pub order_id: OrderId,
    pub items: Vec<NewItem>,
}

impl AddItems {
    pub fn new(order_id: OrderId, items: Vec<NewItem>) -> Self {
        Self { order_id, items }
    }
}
