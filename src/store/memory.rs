//! In-process store.
//!
//! Holds the same rows as the Postgres schema behind a mutex and models row
//! locks with one async mutex per cart or inventory row. A checkout stages its
//! writes and applies them on commit, so dropping the transaction is a
//! rollback. Fault points let tests break a checkout halfway through.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use super::{
    CartStore, CatalogLookup, CheckoutStore, CheckoutTransaction, HealthCheck, InventoryStore, LockedLine, OrderPage, OrderStore,
    VariantInfo,
};
use crate::domain::aggregates::inventory::validate_resync;
use crate::domain::aggregates::{Cart, CartError, CartLine, NewOrder, Order, OrderStatus, VariantInventory};
use crate::domain::value_objects::{CartId, CartItemId, Money, OrderId, OrderLineId, Quantity, UserId, VariantId};
use crate::{EcommerceError, Result};

/// Steps of a checkout transaction that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ClaimStock,
    InsertOrder,
    ClearCart,
    Commit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum LockKey {
    Cart(UserId),
    Inventory(VariantId),
}

#[derive(Default)]
struct Tables {
    variants: HashMap<VariantId, VariantInfo>,
    inventory: HashMap<VariantId, VariantInventory>,
    carts: HashMap<UserId, Cart>,
    orders: BTreeMap<OrderId, Order>,
}

struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
    faults: Mutex<HashMap<FailPoint, usize>>,
    sequence: AtomicI64,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                faults: Mutex::new(HashMap::new()),
                sequence: AtomicI64::new(1),
            }),
        }
    }

    /// Registers a catalog variant.
    pub fn add_variant(&self, info: VariantInfo) {
        self.tables().variants.insert(info.id, info);
    }

    /// Registers a variant priced at `price_minor` with `available` units in stock.
    pub fn stock_variant(&self, id: i64, price_minor: i64, available: i32) -> Result<VariantId> {
        let variant_id = VariantId::new(id);
        let price = Money::from_minor(price_minor).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        let inventory = VariantInventory::new(variant_id, available, 0)?;
        let mut tables = self.tables();
        tables.variants.insert(variant_id, VariantInfo { id: variant_id, sku: format!("SKU-{id:05}"), price, attributes: serde_json::json!({}) });
        tables.inventory.insert(variant_id, inventory);
        Ok(variant_id)
    }

    /// Changes a variant's catalog price. False when the variant is unknown.
    pub fn set_price(&self, id: VariantId, price: Money) -> bool {
        match self.tables().variants.get_mut(&id) {
            Some(info) => {
                info.price = price;
                true
            }
            None => false,
        }
    }

    /// Drops a variant from the catalog while leaving its inventory row.
    pub fn delist_variant(&self, id: VariantId) -> bool { self.tables().variants.remove(&id).is_some() }

    pub fn inventory(&self, id: VariantId) -> Option<VariantInventory> { self.tables().inventory.get(&id).cloned() }

    pub fn order_count(&self) -> usize { self.tables().orders.len() }

    /// Makes `point` fail after it has succeeded `passes` more times.
    pub fn fail_on(&self, point: FailPoint, passes: usize) {
        self.inner.faults.lock().unwrap_or_else(PoisonError::into_inner).insert(point, passes);
    }

    /// Takes the inventory row lock the way a concurrent writer would, holding
    /// it until the guard drops.
    pub async fn lock_inventory_row(&self, id: VariantId) -> OwnedMutexGuard<()> {
        self.row_lock(LockKey::Inventory(id)).lock_owned().await
    }

    fn tables(&self) -> MutexGuard<'_, Tables> { self.inner.tables.lock().unwrap_or_else(PoisonError::into_inner) }

    fn next_id(&self) -> i64 { self.inner.sequence.fetch_add(1, Ordering::Relaxed) }

    fn row_lock(&self, key: LockKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    async fn acquire(&self, key: LockKey, wait: Duration) -> Result<OwnedMutexGuard<()>> {
        tokio::time::timeout(wait, self.row_lock(key).lock_owned())
            .await
            .map_err(|_| EcommerceError::Conflict(format!("lock wait on {key:?} exceeded {}ms", wait.as_millis())))
    }

    fn trip(&self, point: FailPoint) -> Result<()> {
        let mut faults = self.inner.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get_mut(&point) {
            Some(0) => {
                faults.remove(&point);
                Err(EcommerceError::Storage(format!("injected failure at {point:?}")))
            }
            Some(passes) => {
                *passes -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn cart_entry<'a>(&self, tables: &'a mut Tables, user: UserId) -> &'a mut Cart {
        tables.carts.entry(user).or_insert_with(|| Cart::new(CartId::new(self.next_id()), user))
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<()> { Ok(()) }
}

#[async_trait]
impl CatalogLookup for MemoryStore {
    async fn get_variant(&self, id: VariantId) -> Result<Option<VariantInfo>> { Ok(self.tables().variants.get(&id).cloned()) }

    async fn get_variants(&self, ids: &[VariantId]) -> Result<HashMap<VariantId, VariantInfo>> {
        let tables = self.tables();
        Ok(ids.iter().filter_map(|id| tables.variants.get(id).map(|info| (*id, info.clone()))).collect())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn snapshot(&self, id: VariantId) -> Result<Option<VariantInventory>> { Ok(self.inventory(id)) }

    async fn reserve(&self, id: VariantId, quantity: Quantity) -> Result<bool> {
        let _row = self.row_lock(LockKey::Inventory(id)).lock_owned().await;
        Ok(self.tables().inventory.get_mut(&id).is_some_and(|inv| inv.reserve(quantity)))
    }

    async fn release(&self, id: VariantId, quantity: Quantity) -> Result<bool> {
        let _row = self.row_lock(LockKey::Inventory(id)).lock_owned().await;
        match self.tables().inventory.get_mut(&id) {
            Some(inv) => {
                inv.release(quantity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn resync(&self, id: VariantId, available: i32, reserved: i32) -> Result<VariantInventory> {
        validate_resync(id, available, reserved)?;
        let _row = self.row_lock(LockKey::Inventory(id)).lock_owned().await;
        let mut tables = self.tables();
        let inv = match tables.inventory.get_mut(&id) {
            Some(inv) => {
                inv.resync(available, reserved)?;
                inv.clone()
            }
            None => {
                let inv = VariantInventory::new(id, available, reserved)?;
                tables.inventory.insert(id, inv.clone());
                inv
            }
        };
        Ok(inv)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load_cart(&self, user: UserId) -> Result<Cart> {
        let mut tables = self.tables();
        Ok(self.cart_entry(&mut tables, user).clone())
    }

    async fn add_line(&self, user: UserId, variant: VariantId, quantity: Quantity, unit_price: Money) -> Result<Option<CartLine>> {
        let _cart = self.row_lock(LockKey::Cart(user)).lock_owned().await;
        let line = CartLine { id: CartItemId::new(self.next_id()), variant_id: variant, quantity, unit_price };
        let mut tables = self.tables();
        match self.cart_entry(&mut tables, user).add_line(line) {
            Ok(line) => Ok(Some(line.clone())),
            Err(CartError::LineLimitExceeded { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_line(&self, user: UserId, item: CartItemId) -> Result<Option<CartLine>> {
        Ok(self.tables().carts.get(&user).and_then(|cart| cart.line(item)).cloned())
    }

    async fn set_line_quantity(&self, user: UserId, item: CartItemId, quantity: Quantity) -> Result<Option<CartLine>> {
        let _cart = self.row_lock(LockKey::Cart(user)).lock_owned().await;
        let mut tables = self.tables();
        let Some(cart) = tables.carts.get_mut(&user) else { return Ok(None) };
        match cart.set_quantity(item, quantity.value()) {
            Ok(line) => Ok(line.cloned()),
            Err(CartError::ItemNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_line(&self, user: UserId, item: CartItemId) -> Result<bool> {
        let _cart = self.row_lock(LockKey::Cart(user)).lock_owned().await;
        let mut tables = self.tables();
        Ok(tables.carts.get_mut(&user).is_some_and(|cart| cart.remove_line(item).is_ok()))
    }

    async fn clear_cart(&self, user: UserId) -> Result<u64> {
        let _cart = self.row_lock(LockKey::Cart(user)).lock_owned().await;
        let mut tables = self.tables();
        Ok(self.cart_entry(&mut tables, user).clear() as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_order(&self, user: UserId, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables().orders.get(&id).filter(|o| o.user_id() == user).cloned())
    }

    async fn list_orders(&self, user: UserId, after: Option<OrderId>, limit: u32) -> Result<OrderPage> {
        let tables = self.tables();
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id() == user && after.map_or(true, |cursor| o.id() < cursor))
            .take(limit as usize + 1)
            .cloned()
            .collect();
        let has_more = orders.len() > limit as usize;
        orders.truncate(limit as usize);
        let cursor = if has_more { orders.last().map(Order::id) } else { None };
        Ok(OrderPage { orders, cursor, has_more })
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> { Ok(self.tables().orders.get(&id).cloned()) }

    async fn update_status(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let mut tables = self.tables();
        match tables.orders.get_mut(&id) {
            Some(order) if order.status() == from => {
                order.advance(to)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn begin_checkout(&self, lock_timeout: Duration) -> Result<Box<dyn CheckoutTransaction>> {
        Ok(Box::new(MemoryCheckoutTx {
            store: self.clone(),
            lock_timeout,
            guards: Vec::new(),
            rows: BTreeMap::new(),
            order: None,
            cleared: None,
        }))
    }
}

/// Staged checkout. Nothing reaches the tables before [`commit`](CheckoutTransaction::commit).
struct MemoryCheckoutTx {
    store: MemoryStore,
    lock_timeout: Duration,
    guards: Vec<OwnedMutexGuard<()>>,
    rows: BTreeMap<VariantId, VariantInventory>,
    order: Option<Order>,
    cleared: Option<UserId>,
}

#[async_trait]
impl CheckoutTransaction for MemoryCheckoutTx {
    async fn lock_cart_lines(&mut self, user: UserId) -> Result<Vec<LockedLine>> {
        self.guards.push(self.store.acquire(LockKey::Cart(user), self.lock_timeout).await?);

        let mut lines: Vec<CartLine> = self.store.tables().carts.get(&user).map(|c| c.lines().to_vec()).unwrap_or_default();
        lines.sort_by_key(|l| l.variant_id);

        for line in &lines {
            self.guards.push(self.store.acquire(LockKey::Inventory(line.variant_id), self.lock_timeout).await?);
        }

        let tables = self.store.tables();
        let mut locked = Vec::with_capacity(lines.len());
        for line in lines {
            let inventory = tables.inventory.get(&line.variant_id).cloned();
            if let Some(inv) = &inventory {
                self.rows.insert(line.variant_id, inv.clone());
            }
            locked.push(LockedLine {
                cart_item_id: line.id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                unit_price: tables.variants.get(&line.variant_id).map(|v| v.price),
                inventory,
            });
        }
        Ok(locked)
    }

    async fn claim_stock(&mut self, variant: VariantId, quantity: Quantity) -> Result<bool> {
        self.store.trip(FailPoint::ClaimStock)?;
        Ok(self.rows.get_mut(&variant).is_some_and(|row| row.claim(quantity).is_ok()))
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        self.store.trip(FailPoint::InsertOrder)?;
        let id = OrderId::new(self.store.next_id());
        let line_ids = order.lines.iter().map(|_| OrderLineId::new(self.store.next_id())).collect();
        let order = Order::placed(id, order, line_ids, Utc::now())?;
        self.order = Some(order.clone());
        Ok(order)
    }

    async fn clear_cart(&mut self, user: UserId) -> Result<u64> {
        self.store.trip(FailPoint::ClearCart)?;
        self.cleared = Some(user);
        Ok(self.store.tables().carts.get(&user).map_or(0, |c| c.line_count() as u64))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.trip(FailPoint::Commit)?;
        let MemoryCheckoutTx { store, guards, rows, order, cleared, .. } = *self;
        {
            let mut tables = store.tables();
            tables.inventory.extend(rows);
            if let Some(order) = order {
                tables.orders.insert(order.id(), order);
            }
            if let Some(user) = cleared {
                if let Some(cart) = tables.carts.get_mut(&user) {
                    cart.clear();
                }
            }
        }
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> { Ok(()) }
}
