//! Application services. Each one owns injected store handles and is cheap to clone.

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod orders;

pub use cart::{CartDetails, CartItemUpdate, CartService};
pub use checkout::{CheckoutCommand, CheckoutService, CheckoutSettings, CheckoutState};
pub use inventory::{Availability, InventoryService};
pub use orders::{OrderService, ORDER_PAGE_SIZE};
