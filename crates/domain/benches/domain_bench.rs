use std::sync::Arc;

use chrono::Utc;
use common::{
    InventoryItemId, ItemCustomization, Money, OrderId, OrderItemId, OrderStatus, ProductId,
    RecipeRuleId, SizeId, UserId,
};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CreateOrder, NewItem, Order, OrderService, PricingPolicy, RecipeBook};
use rust_decimal::Decimal;
use store::{
    CustomerInfo, FulfillmentStore, InMemoryStore, OrderItemRecord, OrderRecord, ProductRecord,
    RecipeRuleRecord,
};

fn product(name: &str) -> ProductRecord {
    ProductRecord {
        id: ProductId::new(),
        name: name.to_string(),
        base_price: Money::from_cents(900),
        active: true,
    }
}

fn recipe(product_id: ProductId, ingredients: usize, size: Option<SizeId>) -> Vec<RecipeRuleRecord> {
    (0..ingredients)
        .map(|i| RecipeRuleRecord {
            id: RecipeRuleId::new(),
            product_id,
            size_id: if i % 3 == 0 { size } else { None },
            inventory_item_id: InventoryItemId::new(),
            quantity_per_unit: Decimal::new(125, 2),
            auto_deduct: i % 5 != 0,
            customizable: i % 2 == 0,
            optional: i % 4 == 0,
        })
        .collect()
}

fn order_items(order_id: OrderId, products: &[ProductRecord], size: SizeId) -> Vec<OrderItemRecord> {
    products
        .iter()
        .enumerate()
        .map(|(position, p)| OrderItemRecord {
            id: OrderItemId::new(),
            order_id,
            position: position as u32,
            product_id: p.id,
            size_id: (position % 2 == 0).then_some(size),
            product_name: p.name.clone(),
            size_label: None,
            quantity: 2,
            unit_price: p.base_price,
            line_total: p.base_price.multiply(2),
            note: None,
            customization: ItemCustomization::default(),
            modifiers: Vec::new(),
        })
        .collect()
}

fn bench_order_consumption(c: &mut Criterion) {
    let size = SizeId::new();
    let products: Vec<ProductRecord> = (0..20).map(|i| product(&format!("Dish {i}"))).collect();
    let mut book = RecipeBook::default();
    for p in &products {
        book.insert(p.id, Some(p.clone()), recipe(p.id, 12, Some(size)));
    }
    let items = order_items(OrderId::new(), &products, size);

    c.bench_function("domain/order_consumption_20_lines", |b| {
        b.iter(|| book.order_consumption(&items).unwrap());
    });
}

fn bench_plan_transition(c: &mut Criterion) {
    let now = Utc::now();
    let record = OrderRecord {
        id: OrderId::new(),
        table_id: None,
        customer: CustomerInfo::default(),
        subtotal: Money::from_cents(1800),
        discount: Money::zero(),
        tax: Money::zero(),
        suggested_tip: Money::zero(),
        total: Money::from_cents(1800),
        status: OrderStatus::Preparing,
        created_by: UserId::new(),
        created_at: now,
        updated_at: now,
        estimated_prep_minutes: None,
        pickup_at: None,
    };
    let order = Order::from_records(record, Vec::new());

    c.bench_function("domain/plan_transition", |b| {
        b.iter(|| order.plan_transition(OrderStatus::Ready).unwrap());
    });
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let taco = product("Taco");
    rt.block_on(async {
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&taco).await.unwrap();
        uow.commit().await.unwrap();
    });
    let service = OrderService::new(store, PricingPolicy::new(1600, 1000));

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cmd = CreateOrder::new(UserId::new()).with_item(NewItem::new(taco.id, 2));
                service.create_order(cmd).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_order_consumption,
    bench_plan_transition,
    bench_create_order,
);
criterion_main!(benches);
