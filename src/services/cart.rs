//! Cart mutations. Stock is checked here but never reserved; only checkout
//! touches inventory counters.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::aggregates::{Cart, CartLine};
use crate::domain::value_objects::{CartItemId, Quantity, UserId, VariantId, MAX_LINE_QUANTITY};
use crate::store::{CartStore, CatalogLookup, InventoryStore, VariantInfo};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartItemUpdate {
    Updated(CartLine),
    Removed(CartItemId),
}

/// A cart with the catalog entry of each line's variant.
#[derive(Clone, Debug)]
pub struct CartDetails {
    pub cart: Cart,
    pub variants: HashMap<VariantId, VariantInfo>,
}

impl CartDetails {
    /// `None` once the variant has left the catalog.
    pub fn variant(&self, id: VariantId) -> Option<&VariantInfo> { self.variants.get(&id) }
}

#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn CatalogLookup>,
    inventory: Arc<dyn InventoryStore>,
    carts: Arc<dyn CartStore>,
}

impl CartService {
    pub fn new(catalog: Arc<dyn CatalogLookup>, inventory: Arc<dyn InventoryStore>, carts: Arc<dyn CartStore>) -> Self {
        Self { catalog, inventory, carts }
    }

    pub async fn get_cart(&self, user: UserId) -> Result<Cart> { self.carts.load_cart(user).await }

    pub async fn get_cart_details(&self, user: UserId) -> Result<CartDetails> {
        let cart = self.carts.load_cart(user).await?;
        let ids: Vec<VariantId> = cart.lines().iter().map(|l| l.variant_id).collect();
        let variants = if ids.is_empty() { HashMap::new() } else { self.catalog.get_variants(&ids).await? };
        Ok(CartDetails { cart, variants })
    }

    pub async fn add_item(&self, user: UserId, variant: VariantId, quantity: Quantity) -> Result<CartLine> {
        let info = self.catalog.get_variant(variant).await?.ok_or_else(|| EcommerceError::not_found("Variant", variant))?;
        let cart = self.carts.load_cart(user).await?;
        let new_total = cart.quantity_after_add(variant, quantity)?;
        self.ensure_stock(variant, new_total).await?;

        let line = self
            .carts
            .add_line(user, variant, quantity, info.price)
            .await?
            .ok_or_else(|| EcommerceError::Validation(format!("Total quantity would exceed {MAX_LINE_QUANTITY}")))?;
        tracing::info!(user_id = %user, variant_id = %variant, quantity = line.quantity.value(), "cart line added");
        Ok(line)
    }

    /// Zero removes the line. Lines in other users' carts are reported as missing.
    pub async fn update_item(&self, user: UserId, item: CartItemId, quantity: u32) -> Result<CartItemUpdate> {
        let line = self.carts.find_line(user, item).await?.ok_or_else(|| EcommerceError::not_found("Cart item", item))?;
        if quantity == 0 {
            self.remove_item(user, item).await?;
            return Ok(CartItemUpdate::Removed(item));
        }

        let quantity = Quantity::new(quantity)?;
        self.ensure_stock(line.variant_id, quantity).await?;
        let updated = self
            .carts
            .set_line_quantity(user, item, quantity)
            .await?
            .ok_or_else(|| EcommerceError::not_found("Cart item", item))?;
        tracing::debug!(user_id = %user, cart_item_id = %item, quantity = quantity.value(), "cart line updated");
        Ok(CartItemUpdate::Updated(updated))
    }

    pub async fn remove_item(&self, user: UserId, item: CartItemId) -> Result<()> {
        if !self.carts.delete_line(user, item).await? {
            return Err(EcommerceError::not_found("Cart item", item));
        }
        tracing::debug!(user_id = %user, cart_item_id = %item, "cart line removed");
        Ok(())
    }

    /// Succeeds on an empty cart.
    pub async fn clear(&self, user: UserId) -> Result<u64> {
        let removed = self.carts.clear_cart(user).await?;
        tracing::debug!(user_id = %user, removed, "cart cleared");
        Ok(removed)
    }

    async fn ensure_stock(&self, variant: VariantId, wanted: Quantity) -> Result<()> {
        let net_available = self.inventory.snapshot(variant).await?.map_or(0, |inv| inv.net_available());
        if i64::from(wanted.value()) > net_available {
            tracing::info!(variant_id = %variant, net_available, requested = wanted.value(), "cart change refused: insufficient stock");
            return Err(EcommerceError::InsufficientStock { variant_id: variant, available: net_available, requested: wanted.value() });
        }
        Ok(())
    }
}
