//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need Docker.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{
    InventoryItemId, ItemCustomization, MarkerId, ModifierOptionId, Money, MovementId,
    MovementKind, MovementOrigin, OrderId, OrderItemId, OrderStatus, ProductId, RecipeRuleId,
    SideEffectKind, SizeId, UserId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CustomerInfo, FulfillmentStore, InventoryItemRecord, ItemModifierRecord, MarkerRecord,
    MovementRecord, OrderItemRecord, OrderRecord, PostgresStore, ProductRecord,
    ProductSizeRecord, RecipeRuleRecord, StoreCapabilities, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_fulfillment_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE side_effect_markers, inventory_movements, order_item_modifiers, \
         order_items, orders, product_ingredient_rules, inventory_items, product_sizes, products",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool).await.unwrap()
}

fn order(status: OrderStatus) -> OrderRecord {
    let now = Utc::now();
    OrderRecord {
        id: OrderId::new(),
        table_id: None,
        customer: CustomerInfo {
            customer_id: None,
            name: Some("Ana".to_string()),
            phone: None,
        },
        subtotal: Money::from_cents(1000),
        discount: Money::zero(),
        tax: Money::from_cents(160),
        suggested_tip: Money::from_cents(100),
        total: Money::from_cents(1160),
        status,
        created_by: UserId::new(),
        created_at: now,
        updated_at: now,
        estimated_prep_minutes: Some(12),
        pickup_at: None,
    }
}

fn inventory_item(name: &str, quantity: Decimal) -> InventoryItemRecord {
    InventoryItemRecord {
        id: InventoryItemId::new(),
        name: name.to_string(),
        category: Some("dairy".to_string()),
        unit: "ml".to_string(),
        quantity,
        min_stock: dec!(100),
        max_stock: None,
        unit_cost: Money::from_cents(2),
        supplier: None,
        updated_at: Utc::now(),
    }
}

fn marker(order_id: OrderId, is_repeat: bool) -> MarkerRecord {
    MarkerRecord {
        id: MarkerId::new(),
        order_id,
        kind: SideEffectKind::InventoryDeduct,
        is_repeat,
        forced: false,
        performed_by: UserId::new(),
        performed_at: Utc::now(),
        detail: serde_json::json!({"movements": 2}),
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn migrated_schema_has_every_capability() {
    let store = get_test_store().await;
    assert_eq!(store.capabilities(), StoreCapabilities::full());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn order_with_items_and_modifiers_round_trips() {
    let store = get_test_store().await;
    let order = order(OrderStatus::Created);
    let item = OrderItemRecord {
        id: OrderItemId::new(),
        order_id: order.id,
        position: 0,
        product_id: ProductId::new(),
        size_id: Some(SizeId::new()),
        product_name: "Latte".to_string(),
        size_label: Some("Large".to_string()),
        quantity: 2,
        unit_price: Money::from_cents(500),
        line_total: Money::from_cents(1000),
        note: Some("extra hot".to_string()),
        customization: ItemCustomization::default().scale(InventoryItemId::new(), dec!(1.5)),
        modifiers: vec![ItemModifierRecord {
            option_id: ModifierOptionId::new(),
            name: "Oat milk".to_string(),
            unit_price: Money::from_cents(50),
        }],
    };

    let mut uow = store.begin().await.unwrap();
    uow.insert_order(&order).await.unwrap();
    uow.insert_order_items(std::slice::from_ref(&item))
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let stored = store.order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Created);
    assert_eq!(stored.total, order.total);
    assert_eq!(stored.estimated_prep_minutes, Some(12));
    assert_eq!(stored.customer.name.as_deref(), Some("Ana"));

    let items = store.order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Latte");
    assert_eq!(items[0].customization, item.customization);
    assert_eq!(items[0].modifiers, item.modifiers);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn rolled_back_unit_of_work_leaves_nothing() {
    let store = get_test_store().await;
    let order = order(OrderStatus::Created);

    {
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();
    }

    assert!(store.order(order.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn movements_and_balance_agree() {
    let store = get_test_store().await;
    let item = inventory_item("milk", Decimal::ZERO);

    let mut uow = store.begin().await.unwrap();
    uow.insert_inventory_item(&item).await.unwrap();
    for quantity in [dec!(1000), dec!(-250.5)] {
        uow.insert_movement(&MovementRecord {
            id: MovementId::new(),
            inventory_item_id: item.id,
            kind: if quantity.is_sign_positive() {
                MovementKind::Entry
            } else {
                MovementKind::Exit
            },
            quantity,
            unit_cost: Money::from_cents(2),
            reason: "test".to_string(),
            origin: MovementOrigin::Manual,
            order_id: None,
            created_by: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }
    uow.set_inventory_quantity(item.id, dec!(749.5), Utc::now())
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let stored = store.inventory_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.quantity, dec!(749.5));
    assert_eq!(store.movement_sum(item.id).await.unwrap(), dec!(749.5));
    assert_eq!(store.movements(item.id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn size_scoped_rules_round_trip() {
    let store = get_test_store().await;
    let product = ProductRecord {
        id: ProductId::new(),
        name: "Latte".to_string(),
        base_price: Money::from_cents(400),
        active: true,
    };
    let size = ProductSizeRecord {
        id: SizeId::new(),
        product_id: product.id,
        label: "Large".to_string(),
        price: Money::from_cents(550),
    };
    let milk = inventory_item("milk", dec!(1000));
    let rule = RecipeRuleRecord {
        id: RecipeRuleId::new(),
        product_id: product.id,
        size_id: Some(size.id),
        inventory_item_id: milk.id,
        quantity_per_unit: dec!(300),
        auto_deduct: true,
        customizable: true,
        optional: false,
    };

    let mut uow = store.begin().await.unwrap();
    uow.insert_product(&product).await.unwrap();
    uow.insert_product_size(&size).await.unwrap();
    uow.insert_inventory_item(&milk).await.unwrap();
    uow.insert_recipe_rule(&rule).await.unwrap();
    uow.commit().await.unwrap();

    assert_eq!(store.recipe_rules(product.id).await.unwrap(), vec![rule]);
    assert_eq!(store.product_size(size.id).await.unwrap(), Some(size));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn second_automatic_marker_violates_unique_index() {
    let store = get_test_store().await;
    let order = order(OrderStatus::Ready);

    let mut uow = store.begin().await.unwrap();
    uow.insert_order(&order).await.unwrap();
    uow.insert_marker(&marker(order.id, false)).await.unwrap();
    uow.insert_marker(&marker(order.id, true)).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let found = uow
        .find_marker(order.id, SideEffectKind::InventoryDeduct)
        .await
        .unwrap();
    assert!(found.is_some_and(|m| !m.is_repeat));

    let result = uow.insert_marker(&marker(order.id, false)).await;
    match result {
        Err(StoreError::UniqueViolation { constraint }) => {
            assert_eq!(constraint, "unique_automatic_marker")
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn orders_with_status_filters_and_sorts() {
    let store = get_test_store().await;
    let mut older = order(OrderStatus::Ready);
    older.created_at = Utc::now() - chrono::Duration::minutes(10);
    let newer = order(OrderStatus::ReadyForPickup);
    let other = order(OrderStatus::Paid);

    let mut uow = store.begin().await.unwrap();
    for o in [&newer, &older, &other] {
        uow.insert_order(o).await.unwrap();
    }
    uow.commit().await.unwrap();

    let ready = store
        .orders_with_status(&[OrderStatus::Ready, OrderStatus::ReadyForPickup], None)
        .await
        .unwrap();
    assert_eq!(
        ready.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![older.id, newer.id]
    );

    let cutoff = Utc::now() - chrono::Duration::minutes(5);
    let early = store
        .orders_with_status(&[OrderStatus::Ready, OrderStatus::ReadyForPickup], Some(cutoff))
        .await
        .unwrap();
    assert_eq!(early.len(), 1);
    assert_eq!(early[0].id, older.id);
}
