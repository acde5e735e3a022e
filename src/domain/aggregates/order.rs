//! Order Aggregate
//!
//! Immutable record of a completed checkout. Lines snapshot the unit price at
//! purchase time; later catalog price changes never reach them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{CurrencyCode, Money, MoneyError, OrderId, OrderLineId, Quantity, UserId, VariantId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Created, Paid, Shipped, Refunded, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Created, Self::Paid, Self::Shipped, Self::Refunded, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Forward-only moves. `refunded` and `cancelled` are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Paid) | (Created, Cancelled) | (Paid, Shipped) | (Paid, Refunded) | (Paid, Cancelled) | (Shipped, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Refunded | Self::Cancelled) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub variant_id: VariantId,
    pub unit_price: Money,
    pub quantity: Quantity,
    pub subtotal: Money,
}

/// Priced line handed to the store before ids exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrderLine {
    pub variant_id: VariantId,
    pub unit_price: Money,
    pub quantity: Quantity,
    pub subtotal: Money,
}

impl NewOrderLine {
    pub fn price(variant_id: VariantId, unit_price: Money, quantity: Quantity) -> Result<Self, OrderError> {
        let subtotal = unit_price.checked_mul(quantity)?;
        Ok(Self { variant_id, unit_price, quantity, subtotal })
    }
}

/// An order that has been priced but not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub currency: CurrencyCode,
    pub total: Money,
    pub shipping_address_id: Option<i64>,
    pub billing_address_id: Option<i64>,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn new(user_id: UserId, currency: CurrencyCode, shipping_address_id: Option<i64>, billing_address_id: Option<i64>, lines: Vec<NewOrderLine>) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let total = sum_subtotals(lines.iter().map(|l| l.subtotal))?;
        Ok(Self { user_id, currency, total, shipping_address_id, billing_address_id, lines })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    currency: CurrencyCode,
    total: Money,
    shipping_address_id: Option<i64>,
    billing_address_id: Option<i64>,
    lines: Vec<OrderLine>,
    created_at: DateTime<Utc>,
}

/// Stored columns of an order row, used to rehydrate an [`Order`].
#[derive(Clone, Debug)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub currency: CurrencyCode,
    pub total: Money,
    pub shipping_address_id: Option<i64>,
    pub billing_address_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Materializes a freshly inserted order. Line ids must pair up with `new.lines`.
    pub fn placed(id: OrderId, new: NewOrder, line_ids: Vec<OrderLineId>, created_at: DateTime<Utc>) -> Result<Self, OrderError> {
        if line_ids.len() != new.lines.len() { return Err(OrderError::Corrupt(id, "line id count mismatch")); }
        let lines = new.lines.into_iter().zip(line_ids).map(|(l, line_id)| OrderLine {
            id: line_id, variant_id: l.variant_id, unit_price: l.unit_price, quantity: l.quantity, subtotal: l.subtotal,
        }).collect();
        Self::restore(OrderRecord {
            id, user_id: new.user_id, status: OrderStatus::Created, currency: new.currency, total: new.total,
            shipping_address_id: new.shipping_address_id, billing_address_id: new.billing_address_id, created_at,
        }, lines)
    }

    /// Rebuilds a stored order, verifying `total == Σ subtotal` and each
    /// `subtotal == unit_price × quantity`.
    pub fn restore(record: OrderRecord, lines: Vec<OrderLine>) -> Result<Self, OrderError> {
        for line in &lines {
            if line.unit_price.checked_mul(line.quantity)? != line.subtotal {
                return Err(OrderError::Corrupt(record.id, "line subtotal mismatch"));
            }
        }
        if sum_subtotals(lines.iter().map(|l| l.subtotal))? != record.total {
            return Err(OrderError::Corrupt(record.id, "total does not match lines"));
        }
        Ok(Self {
            id: record.id, user_id: record.user_id, status: record.status, currency: record.currency, total: record.total,
            shipping_address_id: record.shipping_address_id, billing_address_id: record.billing_address_id, lines, created_at: record.created_at,
        })
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn currency(&self) -> &CurrencyCode { &self.currency }
    pub fn total(&self) -> Money { self.total }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn item_count(&self) -> usize { self.lines.len() }
    pub fn shipping_address_id(&self) -> Option<i64> { self.shipping_address_id }
    pub fn billing_address_id(&self) -> Option<i64> { self.billing_address_id }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Moves the order forward and returns the event describing the move.
    pub fn advance(&mut self, next: OrderStatus) -> Result<DomainEvent, OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = std::mem::replace(&mut self.status, next);
        Ok(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }))
    }

    pub fn placed_event(&self) -> DomainEvent {
        DomainEvent::Order(OrderEvent::Placed {
            order_id: self.id,
            user_id: self.user_id,
            total: self.total,
            currency: self.currency.clone(),
            item_count: self.lines.len(),
        })
    }
}

fn sum_subtotals(subtotals: impl Iterator<Item = Money>) -> Result<Money, MoneyError> {
    subtotals.into_iter().try_fold(Money::ZERO, Money::checked_add)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("an order needs at least one line")]
    NoItems,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown order status {0:?}")]
    UnknownStatus(String),
    #[error("order {0} is inconsistent: {1}")]
    Corrupt(OrderId, &'static str),
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_line(variant: i64, price: i64, qty: u32) -> NewOrderLine {
        NewOrderLine::price(VariantId::new(variant), Money::from_minor(price).unwrap(), Quantity::new(qty).unwrap()).unwrap()
    }

    fn placed() -> Order {
        let new = NewOrder::new(UserId::new(3).unwrap(), CurrencyCode::usd(), None, None, vec![new_line(1, 250, 2), new_line(2, 1000, 1)]).unwrap();
        Order::placed(OrderId::new(11), new, vec![OrderLineId::new(1), OrderLineId::new(2)], Utc::now()).unwrap()
    }

    #[test]
    fn test_order_total_is_sum_of_subtotals() {
        let order = placed();
        assert_eq!(order.total().minor_units(), 1500);
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.item_count(), 2);
    }

    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(NewOrder::new(UserId::new(3).unwrap(), CurrencyCode::usd(), None, None, vec![]), Err(OrderError::NoItems));
    }

    #[test]
    fn test_order_workflow() {
        let mut order = placed();
        order.advance(OrderStatus::Paid).unwrap();
        order.advance(OrderStatus::Shipped).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert!(order.advance(OrderStatus::Cancelled).is_err());
        order.advance(OrderStatus::Refunded).unwrap();
        assert!(order.status().is_terminal());
        assert!(order.advance(OrderStatus::Created).is_err());
    }

    #[test]
    fn test_restore_detects_tampered_total() {
        let order = placed();
        let record = OrderRecord {
            id: order.id(), user_id: order.user_id(), status: order.status(), currency: order.currency().clone(),
            total: Money::from_minor(1).unwrap(), shipping_address_id: None, billing_address_id: None, created_at: order.created_at(),
        };
        assert!(matches!(Order::restore(record, order.lines().to_vec()), Err(OrderError::Corrupt(..))));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("pending".parse::<OrderStatus>().is_err());
    }
}
