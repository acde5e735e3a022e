use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::Validate;

use super::extract::{ApiPath, ApiQuery, CallerId};
use super::requests::{CheckoutRequest, OrdersQuery};
use super::{ok, ok_with, ApiError, AppState};
use crate::domain::aggregates::{Order, OrderLine, OrderStatus};
use crate::domain::value_objects::OrderId;

#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub id: i64,
    pub variant_id: i64,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

impl From<&OrderLine> for OrderItemView {
    fn from(line: &OrderLine) -> Self {
        Self {
            id: line.id.value(),
            variant_id: line.variant_id.value(),
            unit_price_cents: line.unit_price.minor_units(),
            quantity: line.quantity.value(),
            subtotal_cents: line.subtotal.minor_units(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: i64,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    pub item_count: usize,
    pub shipping_address_id: Option<i64>,
    pub billing_address_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().value(),
            status: order.status(),
            total_cents: order.total().minor_units(),
            currency: order.currency().to_string(),
            item_count: order.item_count(),
            shipping_address_id: order.shipping_address_id(),
            billing_address_id: order.billing_address_id(),
            created_at: order.created_at(),
            items: order.lines().iter().map(OrderItemView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListView {
    pub orders: Vec<OrderView>,
    pub cursor: Option<i64>,
    pub has_more: bool,
}

/// The body is optional; an empty one checks out with defaults.
pub async fn checkout(State(state): State<AppState>, CallerId(user): CallerId, body: Bytes) -> Result<Response, ApiError> {
    let request: CheckoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid checkout body: {e}")))?
    };
    request.validate().map_err(|e| ApiError::validation(e.to_string()))?;

    let order = state.checkout.checkout(request.into_command(user)?).await?;
    let receipt = CheckoutReceipt {
        order_id: order.id().value(),
        status: order.status(),
        total_cents: order.total().minor_units(),
        currency: order.currency().to_string(),
        item_count: order.item_count(),
    };
    Ok((StatusCode::CREATED, ok_with(receipt, "Order placed successfully.")).into_response())
}

pub async fn list_orders(State(state): State<AppState>, CallerId(user): CallerId, ApiQuery(query): ApiQuery<OrdersQuery>) -> Result<Response, ApiError> {
    let page = state.orders.list(user, query.after.map(OrderId::new)).await?;
    let view = OrderListView {
        orders: page.orders.iter().map(OrderView::from).collect(),
        cursor: page.cursor.map(OrderId::value),
        has_more: page.has_more,
    };
    Ok(ok(view).into_response())
}

pub async fn get_order(State(state): State<AppState>, CallerId(user): CallerId, ApiPath(order_id): ApiPath<i64>) -> Result<Response, ApiError> {
    let order = state.orders.get(user, OrderId::new(order_id)).await?;
    Ok(ok(OrderView::from(&order)).into_response())
}
