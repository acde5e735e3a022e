//! Advisory inventory endpoints. Checkout never goes through these.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use validator::Validate;

use super::extract::{ApiPath, ApiQuery, ValidJson};
use super::requests::{AvailabilityQuery, QuantityRequest, ResyncRequest};
use super::{ok, ok_with, ApiError, AppState};
use crate::domain::aggregates::VariantInventory;
use crate::domain::value_objects::{Quantity, VariantId};
use crate::EcommerceError;

#[derive(Debug, Serialize)]
pub struct InventoryView {
    pub variant_id: i64,
    pub available: i32,
    pub reserved: i32,
    pub net_available: i64,
}

impl From<&VariantInventory> for InventoryView {
    fn from(inv: &VariantInventory) -> Self {
        Self { variant_id: inv.variant_id().value(), available: inv.available(), reserved: inv.reserved(), net_available: inv.net_available() }
    }
}

pub async fn availability(
    State(state): State<AppState>,
    ApiPath(variant_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> Result<Response, ApiError> {
    query.validate().map_err(|e| ApiError::validation(e.to_string()))?;
    let quantity = Quantity::new(query.quantity.unwrap_or(1)).map_err(EcommerceError::from)?;
    let availability = state.inventory.availability(VariantId::new(variant_id), quantity).await?;
    Ok(ok(availability).into_response())
}

pub async fn reserve(
    State(state): State<AppState>,
    ApiPath(variant_id): ApiPath<i64>,
    ValidJson(body): ValidJson<QuantityRequest>,
) -> Result<Response, ApiError> {
    let variant = VariantId::new(variant_id);
    let quantity = body.quantity()?;
    if !state.inventory.reserve(variant, quantity).await? {
        let available = state.inventory.availability(variant, quantity).await?.net_available;
        return Err(EcommerceError::InsufficientStock { variant_id: variant, available, requested: quantity.value() }.into());
    }
    Ok(ok_with(serde_json::json!({ "variant_id": variant, "reserved": quantity.value() }), "Inventory reserved.").into_response())
}

pub async fn release(
    State(state): State<AppState>,
    ApiPath(variant_id): ApiPath<i64>,
    ValidJson(body): ValidJson<QuantityRequest>,
) -> Result<Response, ApiError> {
    let variant = VariantId::new(variant_id);
    if !state.inventory.release(variant, body.quantity()?).await? {
        return Err(EcommerceError::not_found("Inventory for variant", variant).into());
    }
    Ok(ok_with(serde_json::json!({ "variant_id": variant, "released": body.quantity }), "Inventory released.").into_response())
}

pub async fn resync(
    State(state): State<AppState>,
    ApiPath(variant_id): ApiPath<i64>,
    ValidJson(body): ValidJson<ResyncRequest>,
) -> Result<Response, ApiError> {
    let inventory = state.inventory.resync(VariantId::new(variant_id), body.available, body.reserved).await?;
    Ok(ok_with(InventoryView::from(&inventory), "Inventory updated.").into_response())
}
