//! Persistence boundary.
//!
//! Services depend on these traits rather than on a concrete database, so a
//! pool handle is injected at construction. Two implementations ship:
//! [`postgres::PgStore`] for production and [`memory::MemoryStore`] for tests
//! and local experiments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::aggregates::{Cart, CartLine, NewOrder, Order, OrderStatus, VariantInventory};
use crate::domain::value_objects::{CartItemId, Money, OrderId, Quantity, UserId, VariantId};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Catalog facts the core needs about a variant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariantInfo {
    pub id: VariantId,
    pub sku: String,
    pub price: Money,
    pub attributes: serde_json::Value,
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Read-only view of the catalog. Never cached: prices must be fresh.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_variant(&self, id: VariantId) -> Result<Option<VariantInfo>>;

    /// Batch lookup; ids the catalog does not know are absent from the map.
    async fn get_variants(&self, ids: &[VariantId]) -> Result<HashMap<VariantId, VariantInfo>> {
        let mut found = HashMap::with_capacity(ids.len());
        for &id in ids {
            if let Some(info) = self.get_variant(id).await? {
                found.insert(id, info);
            }
        }
        Ok(found)
    }
}

/// Advisory-path inventory access, outside any checkout transaction.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn snapshot(&self, id: VariantId) -> Result<Option<VariantInventory>>;

    /// Conditional `reserved += quantity` guarded by `available - reserved >= quantity`,
    /// evaluated atomically against concurrent writers.
    async fn reserve(&self, id: VariantId, quantity: Quantity) -> Result<bool>;

    /// `reserved = max(0, reserved - quantity)`. False when the variant has no inventory row.
    async fn release(&self, id: VariantId, quantity: Quantity) -> Result<bool>;

    /// Administrative overwrite of both counters, creating the row if missing.
    async fn resync(&self, id: VariantId, available: i32, reserved: i32) -> Result<VariantInventory>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the user's cart, creating an empty one on first touch.
    async fn load_cart(&self, user: UserId) -> Result<Cart>;

    /// Merge-adds `quantity` of the variant and records `unit_price` on the line.
    /// Returns `None` without writing if the merged quantity would pass the line cap.
    async fn add_line(&self, user: UserId, variant: VariantId, quantity: Quantity, unit_price: Money) -> Result<Option<CartLine>>;

    /// Line lookup restricted to lines in `user`'s own cart.
    async fn find_line(&self, user: UserId, item: CartItemId) -> Result<Option<CartLine>>;

    async fn set_line_quantity(&self, user: UserId, item: CartItemId, quantity: Quantity) -> Result<Option<CartLine>>;

    /// Deletes one of `user`'s lines. False when no such line is owned by `user`.
    async fn delete_line(&self, user: UserId, item: CartItemId) -> Result<bool>;

    /// Deletes every line in `user`'s cart and returns how many went.
    async fn clear_cart(&self, user: UserId) -> Result<u64>;
}

/// One page of a user's order history, newest first.
#[derive(Clone, Debug, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub cursor: Option<OrderId>,
    pub has_more: bool,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Order owned by `user`, with lines.
    async fn get_order(&self, user: UserId, id: OrderId) -> Result<Option<Order>>;

    /// Orders with ids below `after` (all when `None`), newest first.
    async fn list_orders(&self, user: UserId, after: Option<OrderId>, limit: u32) -> Result<OrderPage>;

    /// Looks up any order regardless of owner, for downstream collaborators.
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Compare-and-set status move. False when the stored status is no longer `from`.
    async fn update_status(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<bool>;
}

/// A cart line joined with the variant's live price and its locked inventory row.
#[derive(Clone, Debug, PartialEq)]
pub struct LockedLine {
    pub cart_item_id: CartItemId,
    pub variant_id: VariantId,
    pub quantity: Quantity,
    /// Current catalog price; `None` if the variant has left the catalog.
    pub unit_price: Option<Money>,
    /// `None` when the variant was never stocked.
    pub inventory: Option<VariantInventory>,
}

/// Opens checkout units of work.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Starts a transaction whose row-lock waits are bounded by `lock_timeout`.
    async fn begin_checkout(&self, lock_timeout: Duration) -> Result<Box<dyn CheckoutTransaction>>;
}

/// A single all-or-nothing checkout. Dropping it without [`commit`] discards
/// every write.
///
/// [`commit`]: CheckoutTransaction::commit
#[async_trait]
pub trait CheckoutTransaction: Send {
    /// Locks the user's cart, then the inventory rows of every line in
    /// ascending variant order, and returns the lines in that order.
    async fn lock_cart_lines(&mut self, user: UserId) -> Result<Vec<LockedLine>>;

    /// `available -= quantity; reserved += quantity` on a locked row.
    /// False if `available` cannot cover the claim.
    async fn claim_stock(&mut self, variant: VariantId, quantity: Quantity) -> Result<bool>;

    /// Inserts the order row and one row per line.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    async fn clear_cart(&mut self, user: UserId) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
