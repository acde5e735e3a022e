//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{CurrencyCode, Money, OrderId, UserId, VariantId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Inventory(InventoryEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    Reserved { variant_id: VariantId, quantity: u32 },
    Released { variant_id: VariantId, quantity: u32 },
    Claimed { variant_id: VariantId, quantity: u32, order_id: OrderId },
    Resynced { variant_id: VariantId, available: i32, reserved: i32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: UserId, total: Money, currency: CurrencyCode, item_count: usize },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
}

impl DomainEvent {
    /// Subject suffix the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Inventory(InventoryEvent::Reserved { .. }) => "inventory.reserved",
            Self::Inventory(InventoryEvent::Released { .. }) => "inventory.released",
            Self::Inventory(InventoryEvent::Claimed { .. }) => "inventory.claimed",
            Self::Inventory(InventoryEvent::Resynced { .. }) => "inventory.resynced",
            Self::Order(OrderEvent::Placed { .. }) => "orders.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = DomainEvent::Inventory(InventoryEvent::Released { variant_id: VariantId::new(4), quantity: 2 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "inventory");
        assert_eq!(json["event"]["type"], "released");
        assert_eq!(json["event"]["variant_id"], 4);
        assert_eq!(event.subject(), "inventory.released");
    }
}
