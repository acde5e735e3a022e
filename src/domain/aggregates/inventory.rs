//! Variant Inventory Aggregate
//!
//! Stock counters for one purchasable variant. `available` counts units not
//! yet claimed, `reserved` counts units claimed by checkouts (or by the
//! advisory reservation path). Both stay non-negative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::value_objects::{Quantity, VariantId};

/// Upper bound accepted by an administrative resync.
pub const MAX_STOCK_PER_VARIANT: i32 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInventory {
    variant_id: VariantId,
    available: i32,
    reserved: i32,
    last_updated: DateTime<Utc>,
}

impl VariantInventory {
    pub fn new(variant_id: VariantId, available: i32, reserved: i32) -> Result<Self, InventoryError> {
        Self::restore(variant_id, available, reserved, Utc::now())
    }

    /// Rebuilds a row read from storage, rejecting counters that break the invariant.
    pub fn restore(variant_id: VariantId, available: i32, reserved: i32, last_updated: DateTime<Utc>) -> Result<Self, InventoryError> {
        if available < 0 || reserved < 0 {
            return Err(InventoryError::NegativeCounter { variant_id, available, reserved });
        }
        Ok(Self { variant_id, available, reserved, last_updated })
    }

    pub fn variant_id(&self) -> VariantId { self.variant_id }
    pub fn available(&self) -> i32 { self.available }
    pub fn reserved(&self) -> i32 { self.reserved }
    pub fn last_updated(&self) -> DateTime<Utc> { self.last_updated }

    /// `available - reserved`. May be negative after checkout claims, which
    /// move units into `reserved` and out of `available` at the same time.
    pub fn net_available(&self) -> i64 { i64::from(self.available) - i64::from(self.reserved) }

    pub fn can_supply(&self, quantity: Quantity) -> bool { self.net_available() >= i64::from(quantity.value()) }

    /// Advisory reservation: `reserved += quantity` if net availability allows it.
    /// Returns false, leaving the row untouched, when stock is short.
    pub fn reserve(&mut self, quantity: Quantity) -> bool {
        if !self.can_supply(quantity) { return false; }
        let Some(reserved) = self.reserved.checked_add(i32::from(quantity)) else { return false };
        self.reserved = reserved;
        self.touch();
        true
    }

    /// `reserved = max(0, reserved - quantity)`; never fails.
    pub fn release(&mut self, quantity: Quantity) {
        self.reserved = self.reserved.saturating_sub(i32::from(quantity)).max(0);
        self.touch();
    }

    /// Checkout claim: `available -= quantity; reserved += quantity` together.
    pub fn claim(&mut self, quantity: Quantity) -> Result<(), InventoryError> {
        let q = i32::from(quantity);
        if self.available < q {
            return Err(InventoryError::Insufficient { variant_id: self.variant_id, available: self.net_available(), requested: quantity.value() });
        }
        let reserved = self.reserved.checked_add(q).ok_or(InventoryError::CounterOverflow(self.variant_id))?;
        self.available -= q;
        self.reserved = reserved;
        self.touch();
        Ok(())
    }

    /// Administrative overwrite of both counters.
    pub fn resync(&mut self, available: i32, reserved: i32) -> Result<(), InventoryError> {
        validate_resync(self.variant_id, available, reserved)?;
        self.available = available;
        self.reserved = reserved;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.last_updated = Utc::now(); }
}

pub fn validate_resync(variant_id: VariantId, available: i32, reserved: i32) -> Result<(), InventoryError> {
    if available < 0 || reserved < 0 {
        return Err(InventoryError::NegativeCounter { variant_id, available, reserved });
    }
    if available > MAX_STOCK_PER_VARIANT {
        return Err(InventoryError::AboveStockLimit { available, limit: MAX_STOCK_PER_VARIANT });
    }
    if reserved > available {
        return Err(InventoryError::ReservedExceedsAvailable { available, reserved });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("inventory for variant {variant_id} has negative counters (available={available}, reserved={reserved})")]
    NegativeCounter { variant_id: VariantId, available: i32, reserved: i32 },
    #[error("insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    Insufficient { variant_id: VariantId, available: i64, requested: u32 },
    #[error("available stock cannot exceed {limit}, got {available}")]
    AboveStockLimit { available: i32, limit: i32 },
    #[error("reserved ({reserved}) cannot exceed available ({available})")]
    ReservedExceedsAvailable { available: i32, reserved: i32 },
    #[error("counter overflow for variant {0}")]
    CounterOverflow(VariantId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_reserve_respects_net_available() {
        let mut inv = VariantInventory::new(VariantId::new(1), 10, 4).unwrap();
        assert!(inv.reserve(qty(6)));
        assert_eq!(inv.reserved(), 10);
        assert!(!inv.reserve(qty(1)));
        assert_eq!(inv.reserved(), 10);
    }

    #[test]
    fn test_release_clamps_at_zero() {
        let mut inv = VariantInventory::new(VariantId::new(1), 10, 3).unwrap();
        inv.release(qty(5));
        assert_eq!(inv.reserved(), 0);
        inv.release(qty(5));
        assert_eq!(inv.reserved(), 0);
    }

    #[test]
    fn test_claim_moves_units_from_available_to_reserved() {
        let mut inv = VariantInventory::new(VariantId::new(7), 10, 0).unwrap();
        inv.claim(qty(6)).unwrap();
        assert_eq!((inv.available(), inv.reserved()), (4, 6));
        assert_eq!(inv.net_available(), -2);
        assert!(!inv.can_supply(qty(1)));
        assert!(matches!(inv.claim(qty(5)), Err(InventoryError::Insufficient { .. })));
        assert_eq!((inv.available(), inv.reserved()), (4, 6));
    }

    #[test]
    fn test_restore_rejects_negative_counters() {
        assert!(VariantInventory::new(VariantId::new(1), -1, 0).is_err());
        assert!(VariantInventory::new(VariantId::new(1), 0, -1).is_err());
    }

    #[test]
    fn test_resync_rules() {
        let mut inv = VariantInventory::new(VariantId::new(1), 0, 0).unwrap();
        assert!(inv.resync(5, 6).is_err());
        assert!(inv.resync(10_001, 0).is_err());
        inv.resync(20, 5).unwrap();
        assert_eq!(inv.net_available(), 15);
    }
}
