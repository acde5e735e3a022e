use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::extract::{ApiPath, CallerId, ValidJson};
use super::requests::{AddItemRequest, UpdateItemRequest};
use super::{ok, ok_with, ApiError, AppState};
use crate::domain::aggregates::CartLine;
use crate::domain::value_objects::CartItemId;
use crate::services::{CartDetails, CartItemUpdate};
use crate::store::VariantInfo;
use crate::EcommerceError;

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub id: i64,
    pub variant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl CartItemView {
    fn new(line: &CartLine, variant: Option<&VariantInfo>) -> Result<Self, EcommerceError> {
        Ok(Self {
            id: line.id.value(),
            variant_id: line.variant_id.value(),
            variant_sku: variant.map(|v| v.sku.clone()),
            attributes: variant.map(|v| v.attributes.clone()),
            quantity: line.quantity.value(),
            unit_price_cents: line.unit_price.minor_units(),
            line_total_cents: line.line_total()?.minor_units(),
        })
    }
}

impl TryFrom<&CartLine> for CartItemView {
    type Error = EcommerceError;

    fn try_from(line: &CartLine) -> Result<Self, Self::Error> { Self::new(line, None) }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart_id: i64,
    pub user_id: i64,
    pub items: Vec<CartItemView>,
    pub total_items: usize,
    pub total_quantity: u32,
    pub total_cents: i64,
    pub is_empty: bool,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&CartDetails> for CartView {
    type Error = EcommerceError;

    fn try_from(details: &CartDetails) -> Result<Self, Self::Error> {
        let cart = &details.cart;
        let total = cart.display_total()?;
        Ok(Self {
            cart_id: cart.id().value(),
            user_id: cart.user_id().value(),
            items: cart
                .lines()
                .iter()
                .map(|line| CartItemView::new(line, details.variant(line.variant_id)))
                .collect::<Result<_, _>>()?,
            total_items: cart.line_count(),
            total_quantity: cart.total_quantity(),
            total_cents: total.minor_units(),
            is_empty: cart.is_empty(),
            updated_at: cart.updated_at(),
        })
    }
}

pub async fn get_cart(State(state): State<AppState>, CallerId(user): CallerId) -> Result<Response, ApiError> {
    let details = state.carts.get_cart_details(user).await?;
    Ok(ok(CartView::try_from(&details)?).into_response())
}

pub async fn add_item(
    State(state): State<AppState>,
    CallerId(user): CallerId,
    ValidJson(body): ValidJson<AddItemRequest>,
) -> Result<Response, ApiError> {
    let (variant, quantity) = body.into_command()?;
    let line = state.carts.add_item(user, variant, quantity).await?;
    Ok((StatusCode::CREATED, ok_with(CartItemView::try_from(&line)?, "Item added to cart.")).into_response())
}

pub async fn update_item(
    State(state): State<AppState>,
    CallerId(user): CallerId,
    ApiPath(item_id): ApiPath<i64>,
    ValidJson(body): ValidJson<UpdateItemRequest>,
) -> Result<Response, ApiError> {
    let response = match state.carts.update_item(user, CartItemId::new(item_id), body.quantity).await? {
        CartItemUpdate::Updated(line) => ok_with(CartItemView::try_from(&line)?, "Cart item updated.").into_response(),
        CartItemUpdate::Removed(id) => ok_with(serde_json::json!({ "id": id, "removed": true }), "Cart item removed.").into_response(),
    };
    Ok(response)
}

pub async fn remove_item(State(state): State<AppState>, CallerId(user): CallerId, ApiPath(item_id): ApiPath<i64>) -> Result<Response, ApiError> {
    let id = CartItemId::new(item_id);
    state.carts.remove_item(user, id).await?;
    Ok(ok_with(serde_json::json!({ "id": id, "removed": true }), "Cart item removed.").into_response())
}

pub async fn clear_cart(State(state): State<AppState>, CallerId(user): CallerId) -> Result<Response, ApiError> {
    let removed = state.carts.clear(user).await?;
    Ok(ok_with(serde_json::json!({ "removed": removed }), "Cart cleared.").into_response())
}
