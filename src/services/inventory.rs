//! Advisory inventory operations, outside any checkout.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::aggregates::inventory::validate_resync;
use crate::domain::aggregates::VariantInventory;
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::domain::value_objects::{Quantity, VariantId};
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{CatalogLookup, InventoryStore};
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub variant_id: VariantId,
    pub requested: u32,
    pub net_available: i64,
    pub is_available: bool,
}

#[derive(Clone)]
pub struct InventoryService {
    catalog: Arc<dyn CatalogLookup>,
    inventory: Arc<dyn InventoryStore>,
    events: Arc<dyn EventPublisher>,
}

impl InventoryService {
    pub fn new(catalog: Arc<dyn CatalogLookup>, inventory: Arc<dyn InventoryStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { catalog, inventory, events }
    }

    /// Point-in-time answer; a later checkout re-checks under lock.
    pub async fn availability(&self, variant: VariantId, quantity: Quantity) -> Result<Availability> {
        let net_available = self.inventory.snapshot(variant).await?.map_or(0, |inv| inv.net_available());
        Ok(Availability {
            variant_id: variant,
            requested: quantity.value(),
            net_available,
            is_available: net_available >= i64::from(quantity.value()),
        })
    }

    pub async fn check_availability(&self, variant: VariantId, quantity: Quantity) -> Result<bool> {
        Ok(self.availability(variant, quantity).await?.is_available)
    }

    pub async fn reserve(&self, variant: VariantId, quantity: Quantity) -> Result<bool> {
        let reserved = self.inventory.reserve(variant, quantity).await?;
        if reserved {
            tracing::debug!(variant_id = %variant, quantity = quantity.value(), "inventory reserved");
            let event = DomainEvent::Inventory(InventoryEvent::Reserved { variant_id: variant, quantity: quantity.value() });
            publish_all(self.events.as_ref(), &[event]).await;
        } else {
            tracing::info!(variant_id = %variant, quantity = quantity.value(), "reservation refused: insufficient stock");
        }
        Ok(reserved)
    }

    /// Clamped at zero; releasing more than is reserved is not an error.
    pub async fn release(&self, variant: VariantId, quantity: Quantity) -> Result<bool> {
        let released = self.inventory.release(variant, quantity).await?;
        if released {
            let event = DomainEvent::Inventory(InventoryEvent::Released { variant_id: variant, quantity: quantity.value() });
            publish_all(self.events.as_ref(), &[event]).await;
        }
        Ok(released)
    }

    pub async fn resync(&self, variant: VariantId, available: i32, reserved: i32) -> Result<VariantInventory> {
        validate_resync(variant, available, reserved).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        if self.catalog.get_variant(variant).await?.is_none() {
            return Err(EcommerceError::not_found("Variant", variant));
        }
        let inventory = self.inventory.resync(variant, available, reserved).await?;
        tracing::info!(variant_id = %variant, available, reserved, "inventory resynced");
        let event = DomainEvent::Inventory(InventoryEvent::Resynced { variant_id: variant, available, reserved });
        publish_all(self.events.as_ref(), &[event]).await;
        Ok(inventory)
    }
}
