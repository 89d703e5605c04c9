//! Order service providing the create and add-items operations.

use std::sync::Arc;

use chrono::Utc;
use common::OrderId;
use store::{FulfillmentStore, OrderItemRecord, UnitOfWork};

use crate::error::DomainError;

use super::{AddItems, CreateOrder, NewItem, Order, OrderError, PricedItem, PricingPolicy};

/// Loads an order inside a unit of work, locking its row.
pub async fn lock_order(uow: &mut dyn UnitOfWork, order_id: OrderId) -> Result<Order, DomainError> {
    let record = uow
        .lock_order(order_id)
        .await?
        .ok_or(DomainError::UnknownOrder(order_id))?;
    let items = uow.order_items(order_id).await?;
    Ok(Order::from_records(record, items))
}

/// Prices requested lines against the catalog and captures the name snapshot.
async fn price_items(
    uow: &mut dyn UnitOfWork,
    items: Vec<NewItem>,
) -> Result<Vec<PricedItem>, DomainError> {
    let mut priced = Vec::with_capacity(items.len());
    for item in items {
        let product = uow
            .product(item.product_id)
            .await?
            .ok_or(DomainError::UnknownProduct(item.product_id))?;
        if !product.active {
            return Err(OrderError::InactiveProduct {
                product_id: product.id,
            }
            .into());
        }

        let (unit_price, size_label) = match item.size_id {
            Some(size_id) => {
                let size = uow
                    .product_size(size_id)
                    .await?
                    .filter(|s| s.product_id == product.id)
                    .ok_or(DomainError::UnknownSize {
                        product_id: product.id,
                        size_id,
                    })?;
                (size.price, Some(size.label))
            }
            None => (product.base_price, None),
        };

        priced.push(PricedItem {
            product_id: product.id,
            size_id: item.size_id,
            product_name: product.name,
            size_label,
            quantity: item.quantity,
            unit_price,
            note: item.note,
            customization: item.customization,
            modifiers: item.modifiers,
        });
    }
    Ok(priced)
}

/// Service for creating orders and appending lines.
pub struct OrderService<S: FulfillmentStore> {
    store: Arc<S>,
    policy: PricingPolicy,
}

impl<S: FulfillmentStore> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: Arc<S>, policy: PricingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Creates a new order with its initial lines.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, DomainError> {
        let mut uow = self.store.begin().await?;
        let priced = price_items(uow.as_mut(), cmd.items.clone()).await?;
        let order = Order::create(&cmd, priced, &self.policy, Utc::now())?;

        uow.insert_order(order.record()).await?;
        uow.insert_order_items(order.items()).await?;
        uow.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(total = %order.total(), items = order.items().len(), "Order created");
        Ok(order)
    }

    /// Appends lines to an order that still accepts items.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn add_items(
        &self,
        cmd: AddItems,
    ) -> Result<(Order, Vec<OrderItemRecord>), DomainError> {
        let mut uow = self.store.begin().await?;
        let mut order = lock_order(uow.as_mut(), cmd.order_id).await?;
        let priced = price_items(uow.as_mut(), cmd.items).await?;
        let added = order.add_items(priced, &self.policy, Utc::now())?;

        uow.insert_order_items(&added).await?;
        uow.update_order(order.record()).await?;
        uow.commit().await?;

        tracing::info!(added = added.len(), total = %order.total(), "Items added");
        Ok((order, added))
    }

    /// Loads an order without locking.
    pub async fn load(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let record = self
            .store
            .order(order_id)
            .await?
            .ok_or(DomainError::UnknownOrder(order_id))?;
        let items = self.store.order_items(order_id).await?;
        Ok(Order::from_records(record, items))
    }
}

impl<S: FulfillmentStore> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
        }
    }
}
