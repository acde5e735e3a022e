//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::value_objects::{CartId, CartItemId, Money, MoneyError, Quantity, QuantityError, UserId, VariantId, MAX_LINE_QUANTITY};

/// A user's cart. One per user, created on first touch and reused after checkout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One (variant, quantity) pairing. `unit_price` is the catalog price seen
/// when the line was last added to; display only, checkout re-reads prices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub variant_id: VariantId,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl CartLine {
    pub fn line_total(&self) -> Result<Money, MoneyError> { self.unit_price.checked_mul(self.quantity) }
}

impl Cart {
    pub fn new(id: CartId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self { id, user_id, lines: vec![], created_at: now, updated_at: now }
    }

    /// Rebuilds a cart from stored rows. Storage guarantees one line per variant.
    pub fn restore(id: CartId, user_id: UserId, lines: Vec<CartLine>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, user_id, lines, created_at, updated_at }
    }

    pub fn id(&self) -> CartId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line_count(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn total_quantity(&self) -> u32 { self.lines.iter().map(|l| l.quantity.value()).sum() }

    /// Sum of captured line totals, for display.
    pub fn display_total(&self) -> Result<Money, MoneyError> {
        self.lines.iter().try_fold(Money::ZERO, |acc, l| acc.checked_add(l.line_total()?))
    }

    pub fn line_for_variant(&self, variant_id: VariantId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.variant_id == variant_id)
    }

    pub fn line(&self, id: CartItemId) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == id) }

    /// Quantity the variant's line would hold after adding `quantity`.
    pub fn quantity_after_add(&self, variant_id: VariantId, quantity: Quantity) -> Result<Quantity, CartError> {
        match self.line_for_variant(variant_id) {
            Some(existing) => existing.quantity.checked_add(quantity).map_err(|_| CartError::LineLimitExceeded {
                current: existing.quantity.value(),
                requested: quantity.value(),
                limit: MAX_LINE_QUANTITY,
            }),
            None => Ok(quantity),
        }
    }

    /// Merge-add: bumps the existing line for the variant or appends `line`.
    pub fn add_line(&mut self, line: CartLine) -> Result<&CartLine, CartError> {
        let total = self.quantity_after_add(line.variant_id, line.quantity)?;
        let idx = match self.lines.iter().position(|l| l.variant_id == line.variant_id) {
            Some(idx) => {
                let existing = &mut self.lines[idx];
                existing.quantity = total;
                existing.unit_price = line.unit_price;
                idx
            }
            None => {
                self.lines.push(line);
                self.lines.len() - 1
            }
        };
        self.touch();
        Ok(&self.lines[idx])
    }

    /// Sets a line's quantity; zero removes it.
    pub fn set_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<Option<&CartLine>, CartError> {
        let idx = self.lines.iter().position(|l| l.id == id).ok_or(CartError::ItemNotFound(id))?;
        if quantity == 0 {
            self.lines.remove(idx);
            self.touch();
            return Ok(None);
        }
        let quantity = Quantity::new(quantity).map_err(CartError::Quantity)?;
        self.lines[idx].quantity = quantity;
        self.touch();
        Ok(Some(&self.lines[idx]))
    }

    pub fn remove_line(&mut self, id: CartItemId) -> Result<CartLine, CartError> {
        let idx = self.lines.iter().position(|l| l.id == id).ok_or(CartError::ItemNotFound(id))?;
        let line = self.lines.remove(idx);
        self.touch();
        Ok(line)
    }

    /// Removes every line. Returns how many were dropped; zero is fine.
    pub fn clear(&mut self) -> usize {
        let n = self.lines.len();
        self.lines.clear();
        self.touch();
        n
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),
    #[error("total quantity would exceed {limit} (current: {current}, requested: {requested})")]
    LineLimitExceeded { current: u32, requested: u32, limit: u32 },
    #[error(transparent)]
    Quantity(QuantityError),
}
