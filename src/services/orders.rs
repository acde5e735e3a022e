//! Order history and status moves for downstream collaborators.

use std::sync::Arc;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::value_objects::{OrderId, UserId};
use crate::publisher::{publish_all, EventPublisher};
use crate::store::{OrderPage, OrderStore};
use crate::{EcommerceError, Result};

pub const ORDER_PAGE_SIZE: u32 = 20;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    events: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, events: Arc<dyn EventPublisher>) -> Self { Self { orders, events } }

    /// Orders owned by someone else are reported as missing.
    pub async fn get(&self, user: UserId, id: OrderId) -> Result<Order> {
        self.orders.get_order(user, id).await?.ok_or_else(|| EcommerceError::not_found("Order", id))
    }

    pub async fn list(&self, user: UserId, after: Option<OrderId>) -> Result<OrderPage> {
        self.orders.list_orders(user, after, ORDER_PAGE_SIZE).await
    }

    /// Moves an order to `next`, e.g. `paid` once payment settles.
    pub async fn advance(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let mut order = self.orders.find_order(id).await?.ok_or_else(|| EcommerceError::not_found("Order", id))?;
        let from = order.status();
        let event = order.advance(next)?;
        if !self.orders.update_status(id, from, next).await? {
            return Err(EcommerceError::Conflict(format!("order {id} changed while moving to {next}")));
        }
        tracing::info!(order_id = %id, %from, to = %next, "order status changed");
        publish_all(self.events.as_ref(), &[event]).await;
        Ok(order)
    }
}
