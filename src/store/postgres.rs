//! PostgreSQL store.
//!
//! Runtime-checked `sqlx` queries against the schema in `migrations/`.
//! Checkout runs in one transaction: the cart row is locked first, then the
//! touched inventory rows in ascending variant order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::time::Duration;

use super::{
    CartStore, CatalogLookup, CheckoutStore, CheckoutTransaction, HealthCheck, InventoryStore, LockedLine, OrderPage, OrderStore,
    VariantInfo,
};
use crate::domain::aggregates::inventory::validate_resync;
use crate::domain::aggregates::{Cart, CartLine, NewOrder, Order, OrderLine, OrderRecord, OrderStatus, VariantInventory};
use crate::domain::value_objects::{
    CartId, CartItemId, CurrencyCode, Money, OrderId, OrderLineId, Quantity, UserId, VariantId, MAX_LINE_QUANTITY,
};
use crate::{EcommerceError, Result};

/// SQLSTATEs that mean "someone else holds what we need; try again".
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> EcommerceError {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if let Some(code) = db.code() {
                if matches!(code.as_ref(), LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED | SERIALIZATION_FAILURE) {
                    tracing::warn!(context, code = %code, "store contention");
                    return EcommerceError::Conflict(format!("{context}: concurrent modification, retry"));
                }
            }
        }
        tracing::error!(context, error = %err, "store failure");
        EcommerceError::Storage(format!("{context}: {err}"))
    }
}

fn integrity<E: Display>(context: &'static str) -> impl Fn(E) -> EcommerceError {
    move |err| {
        tracing::error!(context, error = %err, "stored row violates domain invariant");
        EcommerceError::Storage(format!("{context}: {err}"))
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_error("connect"))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EcommerceError::Storage(format!("migrate: {e}")))
    }

    pub fn pool(&self) -> &PgPool { &self.pool }

    async fn ensure_cart(&self, user: UserId) -> Result<CartRow> {
        sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user.value())
            .execute(&self.pool)
            .await
            .map_err(db_error("upsert cart"))?;
        sqlx::query_as::<_, CartRow>("SELECT id, created_at, updated_at FROM carts WHERE user_id = $1")
            .bind(user.value())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("load cart"))
    }

    async fn touch_cart(&self, user: UserId) -> Result<()> {
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE user_id = $1")
            .bind(user.value())
            .execute(&self.pool)
            .await
            .map_err(db_error("touch cart"))?;
        Ok(())
    }

    async fn order_lines(&self, order_ids: &[i64]) -> Result<HashMap<i64, Vec<OrderLine>>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, variant_id, unit_price_cents, quantity, subtotal_cents
             FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("load order items"))?;

        let mut grouped: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id = row.order_id;
            grouped.entry(order_id).or_default().push(row.into_line()?);
        }
        Ok(grouped)
    }
}

#[derive(sqlx::FromRow)]
struct CartRow { id: i64, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

#[derive(sqlx::FromRow)]
struct CartItemRow { id: i64, variant_id: i64, quantity: i32, unit_price_cents: i64 }

impl CartItemRow {
    fn into_line(self) -> Result<CartLine> {
        Ok(CartLine {
            id: CartItemId::new(self.id),
            variant_id: VariantId::new(self.variant_id),
            quantity: Quantity::try_from(self.quantity).map_err(integrity("cart item quantity"))?,
            unit_price: Money::from_minor(self.unit_price_cents).map_err(integrity("cart item price"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow { id: i64, sku: String, price_cents: i64, attributes: serde_json::Value }

impl VariantRow {
    fn into_info(self) -> Result<VariantInfo> {
        Ok(VariantInfo {
            id: VariantId::new(self.id),
            sku: self.sku,
            price: Money::from_minor(self.price_cents).map_err(integrity("variant price"))?,
            attributes: self.attributes,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow { variant_id: i64, available: i32, reserved: i32, last_updated_at: DateTime<Utc> }

impl InventoryRow {
    fn into_inventory(self) -> Result<VariantInventory> {
        VariantInventory::restore(VariantId::new(self.variant_id), self.available, self.reserved, self.last_updated_at)
            .map_err(integrity("inventory row"))
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    status: String,
    total_cents: i64,
    currency: String,
    shipping_address_id: Option<i64>,
    billing_address_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_record(self) -> Result<OrderRecord> {
        Ok(OrderRecord {
            id: OrderId::new(self.id),
            user_id: UserId::new(self.user_id).map_err(integrity("order user"))?,
            status: self.status.parse::<OrderStatus>().map_err(integrity("order status"))?,
            currency: CurrencyCode::new(&self.currency).map_err(integrity("order currency"))?,
            total: Money::from_minor(self.total_cents).map_err(integrity("order total"))?,
            shipping_address_id: self.shipping_address_id,
            billing_address_id: self.billing_address_id,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { id: i64, order_id: i64, variant_id: i64, unit_price_cents: i64, quantity: i32, subtotal_cents: i64 }

impl OrderItemRow {
    fn into_line(self) -> Result<OrderLine> {
        Ok(OrderLine {
            id: OrderLineId::new(self.id),
            variant_id: VariantId::new(self.variant_id),
            unit_price: Money::from_minor(self.unit_price_cents).map_err(integrity("order item price"))?,
            quantity: Quantity::try_from(self.quantity).map_err(integrity("order item quantity"))?,
            subtotal: Money::from_minor(self.subtotal_cents).map_err(integrity("order item subtotal"))?,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, currency, shipping_address_id, billing_address_id, created_at";

#[async_trait]
impl HealthCheck for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(db_error("ping"))?;
        Ok(())
    }
}

#[async_trait]
impl CatalogLookup for PgStore {
    async fn get_variant(&self, id: VariantId) -> Result<Option<VariantInfo>> {
        let row = sqlx::query_as::<_, VariantRow>("SELECT id, sku, price_cents, attributes FROM product_variants WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load variant"))?;
        row.map(VariantRow::into_info).transpose()
    }

    async fn get_variants(&self, ids: &[VariantId]) -> Result<HashMap<VariantId, VariantInfo>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        sqlx::query_as::<_, VariantRow>("SELECT id, sku, price_cents, attributes FROM product_variants WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("load variants"))?
            .into_iter()
            .map(|r| r.into_info().map(|info| (info.id, info)))
            .collect()
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn snapshot(&self, id: VariantId) -> Result<Option<VariantInventory>> {
        sqlx::query_as::<_, InventoryRow>("SELECT variant_id, available, reserved, last_updated_at FROM inventory WHERE variant_id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load inventory"))?
            .map(InventoryRow::into_inventory)
            .transpose()
    }

    async fn reserve(&self, id: VariantId, quantity: Quantity) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE inventory
             SET reserved = reserved + $2, last_updated_at = NOW()
             WHERE variant_id = $1 AND (available - reserved) >= $2",
        )
        .bind(id.value())
        .bind(i32::from(quantity))
        .execute(&self.pool)
        .await
        .map_err(db_error("reserve inventory"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: VariantId, quantity: Quantity) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE inventory
             SET reserved = GREATEST(0, reserved - $2), last_updated_at = NOW()
             WHERE variant_id = $1",
        )
        .bind(id.value())
        .bind(i32::from(quantity))
        .execute(&self.pool)
        .await
        .map_err(db_error("release inventory"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn resync(&self, id: VariantId, available: i32, reserved: i32) -> Result<VariantInventory> {
        validate_resync(id, available, reserved)?;
        sqlx::query_as::<_, InventoryRow>(
            "INSERT INTO inventory (variant_id, available, reserved, last_updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (variant_id) DO UPDATE
             SET available = EXCLUDED.available, reserved = EXCLUDED.reserved, last_updated_at = NOW()
             RETURNING variant_id, available, reserved, last_updated_at",
        )
        .bind(id.value())
        .bind(available)
        .bind(reserved)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("resync inventory"))?
        .into_inventory()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn load_cart(&self, user: UserId) -> Result<Cart> {
        let cart = self.ensure_cart(user).await?;
        let lines = sqlx::query_as::<_, CartItemRow>(
            "SELECT id, variant_id, quantity, unit_price_cents FROM cart_items WHERE cart_id = $1 ORDER BY id",
        )
        .bind(cart.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("load cart items"))?
        .into_iter()
        .map(CartItemRow::into_line)
        .collect::<Result<Vec<_>>>()?;
        Ok(Cart::restore(CartId::new(cart.id), user, lines, cart.created_at, cart.updated_at))
    }

    async fn add_line(&self, user: UserId, variant: VariantId, quantity: Quantity, unit_price: Money) -> Result<Option<CartLine>> {
        let cart = self.ensure_cart(user).await?;
        // The WHERE on the conflict branch keeps concurrent adds under the cap.
        let row = sqlx::query_as::<_, CartItemRow>(
            "INSERT INTO cart_items (cart_id, variant_id, quantity, unit_price_cents)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (cart_id, variant_id) DO UPDATE
             SET quantity = cart_items.quantity + EXCLUDED.quantity,
                 unit_price_cents = EXCLUDED.unit_price_cents,
                 updated_at = NOW()
             WHERE cart_items.quantity + EXCLUDED.quantity <= $5
             RETURNING id, variant_id, quantity, unit_price_cents",
        )
        .bind(cart.id)
        .bind(variant.value())
        .bind(i32::from(quantity))
        .bind(unit_price.minor_units())
        .bind(MAX_LINE_QUANTITY as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("upsert cart item"))?;
        if row.is_some() {
            self.touch_cart(user).await?;
        }
        row.map(CartItemRow::into_line).transpose()
    }

    async fn find_line(&self, user: UserId, item: CartItemId) -> Result<Option<CartLine>> {
        sqlx::query_as::<_, CartItemRow>(
            "SELECT ci.id, ci.variant_id, ci.quantity, ci.unit_price_cents
             FROM cart_items ci JOIN carts c ON c.id = ci.cart_id
             WHERE ci.id = $1 AND c.user_id = $2",
        )
        .bind(item.value())
        .bind(user.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("load cart item"))?
        .map(CartItemRow::into_line)
        .transpose()
    }

    async fn set_line_quantity(&self, user: UserId, item: CartItemId, quantity: Quantity) -> Result<Option<CartLine>> {
        let row = sqlx::query_as::<_, CartItemRow>(
            "UPDATE cart_items ci SET quantity = $3, updated_at = NOW()
             FROM carts c
             WHERE ci.cart_id = c.id AND ci.id = $1 AND c.user_id = $2
             RETURNING ci.id, ci.variant_id, ci.quantity, ci.unit_price_cents",
        )
        .bind(item.value())
        .bind(user.value())
        .bind(i32::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update cart item"))?;
        if row.is_some() {
            self.touch_cart(user).await?;
        }
        row.map(CartItemRow::into_line).transpose()
    }

    async fn delete_line(&self, user: UserId, item: CartItemId) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM cart_items USING carts c
             WHERE cart_items.cart_id = c.id AND c.user_id = $1 AND cart_items.id = $2",
        )
        .bind(user.value())
        .bind(item.value())
        .execute(&self.pool)
        .await
        .map_err(db_error("delete cart item"))?;
        let deleted = result.rows_affected() == 1;
        if deleted {
            self.touch_cart(user).await?;
        }
        Ok(deleted)
    }

    async fn clear_cart(&self, user: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)")
            .bind(user.value())
            .execute(&self.pool)
            .await
            .map_err(db_error("clear cart"))?;
        self.touch_cart(user).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn get_order(&self, user: UserId, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"))
            .bind(id.value())
            .bind(user.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load order"))?;
        let Some(row) = row else { return Ok(None) };
        let mut lines = self.order_lines(&[row.id]).await?;
        let lines = lines.remove(&row.id).unwrap_or_default();
        Ok(Some(Order::restore(row.into_record()?, lines).map_err(integrity("order"))?))
    }

    async fn list_orders(&self, user: UserId, after: Option<OrderId>, limit: u32) -> Result<OrderPage> {
        let mut rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE user_id = $1 AND ($2::BIGINT IS NULL OR id < $2)
             ORDER BY id DESC LIMIT $3"
        ))
        .bind(user.value())
        .bind(after.map(OrderId::value))
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list orders"))?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.order_lines(&ids).await?;
        let orders = rows
            .into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                Order::restore(row.into_record()?, order_lines).map_err(integrity("order"))
            })
            .collect::<Result<Vec<_>>>()?;
        let cursor = if has_more { orders.last().map(Order::id) } else { None };
        Ok(OrderPage { orders, cursor, has_more })
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load order"))?;
        let Some(row) = row else { return Ok(None) };
        let mut lines = self.order_lines(&[row.id]).await?;
        let lines = lines.remove(&row.id).unwrap_or_default();
        Ok(Some(Order::restore(row.into_record()?, lines).map_err(integrity("order"))?))
    }

    async fn update_status(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2")
            .bind(id.value())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("update order status"))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CheckoutStore for PgStore {
    async fn begin_checkout(&self, lock_timeout: Duration) -> Result<Box<dyn CheckoutTransaction>> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin checkout"))?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(db_error("set lock timeout"))?;
        Ok(Box::new(PgCheckoutTx { tx, cart_id: None }))
    }
}

struct PgCheckoutTx {
    tx: Transaction<'static, Postgres>,
    cart_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct LockedLineRow { cart_item_id: i64, variant_id: i64, quantity: i32, price_cents: Option<i64> }

#[async_trait]
impl CheckoutTransaction for PgCheckoutTx {
    async fn lock_cart_lines(&mut self, user: UserId) -> Result<Vec<LockedLine>> {
        // Cart row first: serializes checkouts of the same user.
        let cart_id = sqlx::query_scalar::<_, i64>("SELECT id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user.value())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("lock cart"))?;
        let Some(cart_id) = cart_id else { return Ok(vec![]) };
        self.cart_id = Some(cart_id);

        let rows = sqlx::query_as::<_, LockedLineRow>(
            "SELECT ci.id AS cart_item_id, ci.variant_id, ci.quantity, v.price_cents
             FROM cart_items ci
             LEFT JOIN product_variants v ON v.id = ci.variant_id
             WHERE ci.cart_id = $1
             ORDER BY ci.variant_id",
        )
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("load cart for checkout"))?;
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let variant_ids: Vec<i64> = rows.iter().map(|r| r.variant_id).collect();
        let mut inventory: BTreeMap<i64, VariantInventory> = sqlx::query_as::<_, InventoryRow>(
            "SELECT variant_id, available, reserved, last_updated_at
             FROM inventory
             WHERE variant_id = ANY($1)
             ORDER BY variant_id
             FOR UPDATE",
        )
        .bind(&variant_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("lock inventory"))?
        .into_iter()
        .map(|r| Ok((r.variant_id, r.into_inventory()?)))
        .collect::<Result<_>>()?;

        rows.into_iter()
            .map(|r| {
                Ok(LockedLine {
                    cart_item_id: CartItemId::new(r.cart_item_id),
                    variant_id: VariantId::new(r.variant_id),
                    quantity: Quantity::try_from(r.quantity).map_err(integrity("cart item quantity"))?,
                    unit_price: r.price_cents.map(Money::from_minor).transpose().map_err(integrity("variant price"))?,
                    inventory: inventory.remove(&r.variant_id),
                })
            })
            .collect()
    }

    async fn claim_stock(&mut self, variant: VariantId, quantity: Quantity) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE inventory
             SET available = available - $2, reserved = reserved + $2, last_updated_at = NOW()
             WHERE variant_id = $1 AND available >= $2",
        )
        .bind(variant.value())
        .bind(i32::from(quantity))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("claim inventory"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let (order_id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO orders (user_id, status, total_cents, currency, shipping_address_id, billing_address_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             RETURNING id, created_at",
        )
        .bind(order.user_id.value())
        .bind(OrderStatus::Created.as_str())
        .bind(order.total.minor_units())
        .bind(order.currency.as_str())
        .bind(order.shipping_address_id)
        .bind(order.billing_address_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("insert order"))?;

        let mut line_ids = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO order_items (order_id, variant_id, unit_price_cents, quantity, subtotal_cents)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
            )
            .bind(order_id)
            .bind(line.variant_id.value())
            .bind(line.unit_price.minor_units())
            .bind(i32::from(line.quantity))
            .bind(line.subtotal.minor_units())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("insert order item"))?;
            line_ids.push(OrderLineId::new(id));
        }

        Order::placed(OrderId::new(order_id), order, line_ids, created_at).map_err(integrity("order"))
    }

    async fn clear_cart(&mut self, user: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)")
            .bind(user.value())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("clear cart"))?;
        if let Some(cart_id) = self.cart_id {
            sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
                .bind(cart_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_error("touch cart"))?;
        }
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_error("commit checkout"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(db_error("rollback checkout"))
    }
}
