//! Aggregates module
pub mod inventory;
pub mod order;
pub mod cart;

pub use inventory::{InventoryError, VariantInventory, MAX_STOCK_PER_VARIANT};
pub use order::{NewOrder, NewOrderLine, Order, OrderError, OrderLine, OrderRecord, OrderStatus};
pub use cart::{Cart, CartError, CartLine};
