use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CustomerId, InventoryItemId, ItemCustomization, MarkerId, ModifierOptionId, Money,
    MovementId, OrderId, OrderItemId, OrderStatus, ProductId, RecipeRuleId, SideEffectKind,
    SizeId, TableId, UserId,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CustomerInfo, InventoryItemRecord, ItemModifierRecord, MarkerRecord, MovementRecord,
    OrderItemRecord, OrderRecord, ProductRecord, ProductSizeRecord, RecipeRuleRecord, Result,
    StoreError,
    store::{FulfillmentStore, StoreCapabilities, UnitOfWork},
};

const INVENTORY_COLUMNS: &str = "id, name, category, unit, quantity, min_stock, max_stock, unit_cost, supplier, updated_at";
const MOVEMENT_COLUMNS: &str = "id, inventory_item_id, kind, quantity, unit_cost, reason, origin, order_id, created_by, created_at";
const MARKER_COLUMNS: &str =
    "id, order_id, kind, is_repeat, forced, performed_by, performed_at, detail";

/// PostgreSQL-backed fulfillment store.
///
/// Order and inventory rows are locked with `SELECT ... FOR UPDATE` inside a
/// unit of work; inventory rows are always locked in ascending id order.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    capabilities: StoreCapabilities,
}

impl PostgresStore {
    /// Creates a store over an existing pool and probes the schema once for
    /// optional capabilities.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let capabilities = probe_capabilities(&pool).await?;
        tracing::info!(?capabilities, "Probed storage capabilities");
        Ok(Self { pool, capabilities })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations and re-probes capabilities.
    pub async fn run_migrations(&mut self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        self.capabilities = probe_capabilities(&self.pool).await?;
        Ok(())
    }
}

async fn probe_capabilities(pool: &PgPool) -> Result<StoreCapabilities> {
    async fn column_exists(pool: &PgPool, table: &str, column: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
            )
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    Ok(StoreCapabilities {
        size_scoped_rules: column_exists(pool, "product_ingredient_rules", "size_id").await?,
        item_modifiers: column_exists(pool, "order_item_modifiers", "option_id").await?,
        preparation_times: column_exists(pool, "orders", "estimated_prep_minutes").await?,
    })
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
    }
    StoreError::Database(e)
}

fn to_i32(table: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|e| StoreError::corrupt(table, e))
}

fn to_u32(table: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|e| StoreError::corrupt(table, e))
}

fn order_columns(caps: StoreCapabilities) -> &'static str {
    if caps.preparation_times {
        "id, table_id, customer_id, customer_name, customer_phone, subtotal, discount, tax, \
         suggested_tip, total, status, created_by, created_at, updated_at, \
         estimated_prep_minutes, pickup_at"
    } else {
        "id, table_id, customer_id, customer_name, customer_phone, subtotal, discount, tax, \
         suggested_tip, total, status, created_by, created_at, updated_at, \
         NULL::INTEGER AS estimated_prep_minutes, NULL::TIMESTAMPTZ AS pickup_at"
    }
}

fn rule_columns(caps: StoreCapabilities) -> &'static str {
    if caps.size_scoped_rules {
        "id, product_id, size_id, inventory_item_id, quantity_per_unit, auto_deduct, customizable, optional"
    } else {
        "id, product_id, NULL::UUID AS size_id, inventory_item_id, quantity_per_unit, auto_deduct, customizable, optional"
    }
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get("id")?),
        table_id: row.try_get::<Option<Uuid>, _>("table_id")?.map(TableId::from_uuid),
        customer: CustomerInfo {
            customer_id: row
                .try_get::<Option<Uuid>, _>("customer_id")?
                .map(CustomerId::from_uuid),
            name: row.try_get("customer_name")?,
            phone: row.try_get("customer_phone")?,
        },
        subtotal: Money::from_cents(row.try_get("subtotal")?),
        discount: Money::from_cents(row.try_get("discount")?),
        tax: Money::from_cents(row.try_get("tax")?),
        suggested_tip: Money::from_cents(row.try_get("suggested_tip")?),
        total: Money::from_cents(row.try_get("total")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::corrupt("orders", e))?,
        created_by: UserId::from_uuid(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        estimated_prep_minutes: row
            .try_get::<Option<i32>, _>("estimated_prep_minutes")?
            .map(|m| to_u32("orders", m))
            .transpose()?,
        pickup_at: row.try_get("pickup_at")?,
    })
}

fn row_to_item(row: PgRow) -> Result<OrderItemRecord> {
    let customization: serde_json::Value = row.try_get("customization")?;
    Ok(OrderItemRecord {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        position: to_u32("order_items", row.try_get("position")?)?,
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        size_id: row.try_get::<Option<Uuid>, _>("size_id")?.map(SizeId::from_uuid),
        product_name: row.try_get("product_name")?,
        size_label: row.try_get("size_label")?,
        quantity: to_u32("order_items", row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price")?),
        line_total: Money::from_cents(row.try_get("line_total")?),
        note: row.try_get("note")?,
        customization: serde_json::from_value::<ItemCustomization>(customization)?,
        modifiers: Vec::new(),
    })
}

fn row_to_product(row: PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        base_price: Money::from_cents(row.try_get("base_price")?),
        active: row.try_get("active")?,
    })
}

fn row_to_size(row: PgRow) -> Result<ProductSizeRecord> {
    Ok(ProductSizeRecord {
        id: SizeId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        label: row.try_get("label")?,
        price: Money::from_cents(row.try_get("price")?),
    })
}

fn row_to_rule(row: PgRow) -> Result<RecipeRuleRecord> {
    Ok(RecipeRuleRecord {
        id: RecipeRuleId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        size_id: row.try_get::<Option<Uuid>, _>("size_id")?.map(SizeId::from_uuid),
        inventory_item_id: InventoryItemId::from_uuid(row.try_get("inventory_item_id")?),
        quantity_per_unit: row.try_get("quantity_per_unit")?,
        auto_deduct: row.try_get("auto_deduct")?,
        customizable: row.try_get("customizable")?,
        optional: row.try_get("optional")?,
    })
}

fn row_to_inventory_item(row: PgRow) -> Result<InventoryItemRecord> {
    Ok(InventoryItemRecord {
        id: InventoryItemId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        unit: row.try_get("unit")?,
        quantity: row.try_get("quantity")?,
        min_stock: row.try_get("min_stock")?,
        max_stock: row.try_get("max_stock")?,
        unit_cost: Money::from_cents(row.try_get("unit_cost")?),
        supplier: row.try_get("supplier")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_movement(row: PgRow) -> Result<MovementRecord> {
    let kind: String = row.try_get("kind")?;
    let origin: String = row.try_get("origin")?;
    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id")?),
        inventory_item_id: InventoryItemId::from_uuid(row.try_get("inventory_item_id")?),
        kind: kind
            .parse()
            .map_err(|e| StoreError::corrupt("inventory_movements", e))?,
        quantity: row.try_get("quantity")?,
        unit_cost: Money::from_cents(row.try_get("unit_cost")?),
        reason: row.try_get("reason")?,
        origin: origin
            .parse()
            .map_err(|e| StoreError::corrupt("inventory_movements", e))?,
        order_id: row.try_get::<Option<Uuid>, _>("order_id")?.map(OrderId::from_uuid),
        created_by: row.try_get::<Option<Uuid>, _>("created_by")?.map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_marker(row: PgRow) -> Result<MarkerRecord> {
    let kind: String = row.try_get("kind")?;
    Ok(MarkerRecord {
        id: MarkerId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        kind: kind
            .parse()
            .map_err(|e| StoreError::corrupt("side_effect_markers", e))?,
        is_repeat: row.try_get("is_repeat")?,
        forced: row.try_get("forced")?,
        performed_by: UserId::from_uuid(row.try_get("performed_by")?),
        performed_at: row.try_get("performed_at")?,
        detail: row.try_get("detail")?,
    })
}

// Shared by pool reads and unit-of-work reads.

async fn fetch_order(
    conn: &mut PgConnection,
    caps: StoreCapabilities,
    id: OrderId,
    for_update: bool,
) -> Result<Option<OrderRecord>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1{}",
        order_columns(caps),
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(row_to_order)
        .transpose()
}

async fn fetch_order_items(
    conn: &mut PgConnection,
    caps: StoreCapabilities,
    order_id: OrderId,
) -> Result<Vec<OrderItemRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, order_id, position, product_id, size_id, product_name, size_label,
               quantity, unit_price, line_total, note, customization
        FROM order_items
        WHERE order_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;
    let mut items = rows
        .into_iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>>>()?;

    if caps.item_modifiers && !items.is_empty() {
        let ids: Vec<Uuid> = items.iter().map(|i| i.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT order_item_id, option_id, name, unit_price
            FROM order_item_modifiers
            WHERE order_item_id = ANY($1)
            ORDER BY order_item_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut by_item: HashMap<Uuid, Vec<ItemModifierRecord>> = HashMap::new();
        for row in rows {
            by_item
                .entry(row.try_get("order_item_id")?)
                .or_default()
                .push(ItemModifierRecord {
                    option_id: ModifierOptionId::from_uuid(row.try_get("option_id")?),
                    name: row.try_get("name")?,
                    unit_price: Money::from_cents(row.try_get("unit_price")?),
                });
        }
        for item in &mut items {
            item.modifiers = by_item.remove(&item.id.as_uuid()).unwrap_or_default();
        }
    }

    Ok(items)
}

async fn fetch_product(conn: &mut PgConnection, id: ProductId) -> Result<Option<ProductRecord>> {
    sqlx::query("SELECT id, name, base_price, active FROM products WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(row_to_product)
        .transpose()
}

async fn fetch_product_size(
    conn: &mut PgConnection,
    id: SizeId,
) -> Result<Option<ProductSizeRecord>> {
    sqlx::query("SELECT id, product_id, label, price FROM product_sizes WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(row_to_size)
        .transpose()
}

async fn fetch_recipe_rules(
    conn: &mut PgConnection,
    caps: StoreCapabilities,
    product_id: ProductId,
) -> Result<Vec<RecipeRuleRecord>> {
    let sql = format!(
        "SELECT {} FROM product_ingredient_rules WHERE product_id = $1 ORDER BY id",
        rule_columns(caps)
    );
    sqlx::query(&sql)
        .bind(product_id.as_uuid())
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(row_to_rule)
        .collect()
}

#[async_trait]
impl FulfillmentStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            capabilities: self.capabilities,
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, self.capabilities, id, false).await
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_items(&mut conn, self.capabilities, order_id).await
    }

    async fn orders_with_status(
        &self,
        statuses: &[OrderStatus],
        created_at_or_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderRecord>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "SELECT {} FROM orders WHERE status = ANY($1) AND ($2::TIMESTAMPTZ IS NULL OR created_at <= $2) ORDER BY created_at ASC, id ASC",
            order_columns(self.capabilities)
        );
        sqlx::query(&sql)
            .bind(&statuses)
            .bind(created_at_or_before)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_order)
            .collect()
    }

    async fn markers(&self, order_id: OrderId) -> Result<Vec<MarkerRecord>> {
        let sql = format!(
            "SELECT {MARKER_COLUMNS} FROM side_effect_markers WHERE order_id = $1 ORDER BY performed_at ASC"
        );
        sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_marker)
            .collect()
    }

    async fn product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    async fn product_size(&self, id: SizeId) -> Result<Option<ProductSizeRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product_size(&mut conn, id).await
    }

    async fn recipe_rules(&self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_recipe_rules(&mut conn, self.capabilities, product_id).await
    }

    async fn inventory_item(&self, id: InventoryItemId) -> Result<Option<InventoryItemRecord>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_inventory_item)
            .transpose()
    }

    async fn inventory_items(&self) -> Result<Vec<InventoryItemRecord>> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items ORDER BY name, id");
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_inventory_item)
            .collect()
    }

    async fn movements(&self, item_id: InventoryItemId) -> Result<Vec<MovementRecord>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE inventory_item_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_movement)
            .collect()
    }

    async fn movements_for_order(&self, order_id: OrderId) -> Result<Vec<MovementRecord>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(row_to_movement)
            .collect()
    }

    async fn movement_sum(&self, item_id: InventoryItemId) -> Result<Decimal> {
        let sum: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(quantity) FROM inventory_movements WHERE inventory_item_id = $1",
        )
        .bind(item_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(Decimal::ZERO))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    capabilities: StoreCapabilities,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        fetch_order(&mut self.tx, self.capabilities, id, true).await
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        fetch_order_items(&mut self.tx, self.capabilities, order_id).await
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, table_id, customer_id, customer_name, customer_phone,
                                subtotal, discount, tax, suggested_tip, total, status,
                                created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.table_id.map(|t| t.as_uuid()))
        .bind(order.customer.customer_id.map(|c| c.as_uuid()))
        .bind(&order.customer.name)
        .bind(&order.customer.phone)
        .bind(order.subtotal.cents())
        .bind(order.discount.cents())
        .bind(order.tax.cents())
        .bind(order.suggested_tip.cents())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.created_by.as_uuid())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        if order.estimated_prep_minutes.is_some() || order.pickup_at.is_some() {
            self.update_order(order).await?;
        }
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItemRecord]) -> Result<()> {
        for item in items {
            if !item.modifiers.is_empty() && !self.capabilities.item_modifiers {
                return Err(StoreError::Unsupported("item modifiers"));
            }

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, size_id, product_name,
                                         size_label, quantity, unit_price, line_total, note,
                                         customization)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(to_i32("order_items", item.position)?)
            .bind(item.product_id.as_uuid())
            .bind(item.size_id.map(|s| s.as_uuid()))
            .bind(&item.product_name)
            .bind(&item.size_label)
            .bind(to_i32("order_items", item.quantity)?)
            .bind(item.unit_price.cents())
            .bind(item.line_total.cents())
            .bind(&item.note)
            .bind(serde_json::to_value(&item.customization)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;

            for (position, modifier) in item.modifiers.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO order_item_modifiers (order_item_id, position, option_id, name, unit_price)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(item.id.as_uuid())
                .bind(position as i32)
                .bind(modifier.option_id.as_uuid())
                .bind(&modifier.name)
                .bind(modifier.unit_price.cents())
                .execute(&mut *self.tx)
                .await
                .map_err(map_write_error)?;
            }
        }
        Ok(())
    }

    async fn update_order(&mut self, order: &OrderRecord) -> Result<()> {
        let result = if self.capabilities.preparation_times {
            sqlx::query(
                r#"
                UPDATE orders
                SET subtotal = $2, discount = $3, tax = $4, suggested_tip = $5, total = $6,
                    status = $7, updated_at = $8, estimated_prep_minutes = $9, pickup_at = $10
                WHERE id = $1
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.subtotal.cents())
            .bind(order.discount.cents())
            .bind(order.tax.cents())
            .bind(order.suggested_tip.cents())
            .bind(order.total.cents())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .bind(
                order
                    .estimated_prep_minutes
                    .map(|m| to_i32("orders", m))
                    .transpose()?,
            )
            .bind(order.pickup_at)
            .execute(&mut *self.tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE orders
                SET subtotal = $2, discount = $3, tax = $4, suggested_tip = $5, total = $6,
                    status = $7, updated_at = $8
                WHERE id = $1
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.subtotal.cents())
            .bind(order.discount.cents())
            .bind(order.tax.cents())
            .bind(order.suggested_tip.cents())
            .bind(order.total.cents())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *self.tx)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::corrupt("orders", "order does not exist"));
        }
        Ok(())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        fetch_product(&mut self.tx, id).await
    }

    async fn product_size(&mut self, id: SizeId) -> Result<Option<ProductSizeRecord>> {
        fetch_product_size(&mut self.tx, id).await
    }

    async fn recipe_rules(&mut self, product_id: ProductId) -> Result<Vec<RecipeRuleRecord>> {
        fetch_recipe_rules(&mut self.tx, self.capabilities, product_id).await
    }

    async fn insert_product(&mut self, product: &ProductRecord) -> Result<()> {
        sqlx::query("INSERT INTO products (id, name, base_price, active) VALUES ($1, $2, $3, $4)")
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.base_price.cents())
            .bind(product.active)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn insert_product_size(&mut self, size: &ProductSizeRecord) -> Result<()> {
        sqlx::query("INSERT INTO product_sizes (id, product_id, label, price) VALUES ($1, $2, $3, $4)")
            .bind(size.id.as_uuid())
            .bind(size.product_id.as_uuid())
            .bind(&size.label)
            .bind(size.price.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn insert_recipe_rule(&mut self, rule: &RecipeRuleRecord) -> Result<()> {
        if !self.capabilities.size_scoped_rules {
            if rule.size_id.is_some() {
                return Err(StoreError::Unsupported("size-scoped recipe rules"));
            }
            sqlx::query(
                r#"
                INSERT INTO product_ingredient_rules (id, product_id, inventory_item_id,
                    quantity_per_unit, auto_deduct, customizable, optional)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(rule.id.as_uuid())
            .bind(rule.product_id.as_uuid())
            .bind(rule.inventory_item_id.as_uuid())
            .bind(rule.quantity_per_unit)
            .bind(rule.auto_deduct)
            .bind(rule.customizable)
            .bind(rule.optional)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO product_ingredient_rules (id, product_id, size_id, inventory_item_id,
                quantity_per_unit, auto_deduct, customizable, optional)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(rule.id.as_uuid())
        .bind(rule.product_id.as_uuid())
        .bind(rule.size_id.map(|s| s.as_uuid()))
        .bind(rule.inventory_item_id.as_uuid())
        .bind(rule.quantity_per_unit)
        .bind(rule.auto_deduct)
        .bind(rule.customizable)
        .bind(rule.optional)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn insert_inventory_item(&mut self, item: &InventoryItemRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, name, category, unit, quantity, min_stock,
                                         max_stock, unit_cost, supplier, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.unit)
        .bind(item.quantity)
        .bind(item.min_stock)
        .bind(item.max_stock)
        .bind(item.unit_cost.cents())
        .bind(&item.supplier)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn lock_inventory_items(
        &mut self,
        ids: &[InventoryItemId],
    ) -> Result<Vec<InventoryItemRecord>> {
        let mut ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        ids.sort();
        ids.dedup();
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE id = ANY($1) ORDER BY id ASC FOR UPDATE"
        );
        sqlx::query(&sql)
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(row_to_inventory_item)
            .collect()
    }

    async fn set_inventory_quantity(
        &mut self,
        id: InventoryItemId,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE inventory_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(quantity)
                .bind(at)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::corrupt("inventory_items", "item does not exist"));
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &MovementRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, inventory_item_id, kind, quantity, unit_cost,
                                             reason, origin, order_id, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.inventory_item_id.as_uuid())
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(movement.unit_cost.cents())
        .bind(&movement.reason)
        .bind(movement.origin.as_str())
        .bind(movement.order_id.map(|o| o.as_uuid()))
        .bind(movement.created_by.map(|u| u.as_uuid()))
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_marker(
        &mut self,
        order_id: OrderId,
        kind: SideEffectKind,
    ) -> Result<Option<MarkerRecord>> {
        let sql = format!(
            "SELECT {MARKER_COLUMNS} FROM side_effect_markers WHERE order_id = $1 AND kind = $2 AND NOT is_repeat"
        );
        sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .bind(kind.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_marker)
            .transpose()
    }

    async fn insert_marker(&mut self, marker: &MarkerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO side_effect_markers (id, order_id, kind, is_repeat, forced,
                                             performed_by, performed_at, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(marker.id.as_uuid())
        .bind(marker.order_id.as_uuid())
        .bind(marker.kind.as_str())
        .bind(marker.is_repeat)
        .bind(marker.forced)
        .bind(marker.performed_by.as_uuid())
        .bind(marker.performed_at)
        .bind(&marker.detail)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
