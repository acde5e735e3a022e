//! HTTP surface.
//!
//! Every response uses the same envelope: `{"success", "data", "message"?, "timestamp"}`
//! on success and `{"success": false, "error": {"code", "message"}}` on failure.

pub mod cart;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod orders;
pub mod requests;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::publisher::EventPublisher;
use crate::services::{CartService, CheckoutService, CheckoutSettings, InventoryService, OrderService};
use crate::store::{CartStore, CatalogLookup, CheckoutStore, HealthCheck, InventoryStore, OrderStore};

pub use error::ApiError;

pub const SERVICE_NAME: &str = "opensase-checkout";

#[derive(Clone)]
pub struct AppState {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub inventory: InventoryService,
    pub health: Arc<dyn HealthCheck>,
}

impl AppState {
    /// Wires every service to one store.
    pub fn new<S>(store: S, events: Arc<dyn EventPublisher>, settings: CheckoutSettings) -> Self
    where
        S: CatalogLookup + InventoryStore + CartStore + OrderStore + CheckoutStore + HealthCheck + 'static,
    {
        let store = Arc::new(store);
        Self {
            carts: CartService::new(store.clone(), store.clone(), store.clone()),
            checkout: CheckoutService::new(store.clone(), events.clone(), settings),
            orders: OrderService::new(store.clone(), events.clone()),
            inventory: InventoryService::new(store.clone(), store.clone(), events),
            health: store,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data, message: None, timestamp: Utc::now() })
}

pub fn ok_with<T: Serialize>(data: T, message: &str) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data, message: Some(message.to_string()), timestamp: Utc::now() })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/cart/me", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/me/items", post(cart::add_item))
        .route("/api/v1/cart/me/items/:item_id", patch(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/checkout", post(orders::checkout))
        .route("/api/v1/orders/:order_id", get(orders::get_order))
        .route("/api/v1/inventory/:variant_id", put(inventory::resync))
        .route("/api/v1/inventory/:variant_id/availability", get(inventory::availability))
        .route("/api/v1/inventory/:variant_id/reserve", post(inventory::reserve))
        .route("/api/v1/inventory/:variant_id/release", post(inventory::release))
        .fallback(unknown_route)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn unknown_route() -> ApiError { ApiError::not_found("No such route.") }

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "healthy", "service": SERVICE_NAME, "database": "connected"}))),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unhealthy", "service": SERVICE_NAME, "database": "unreachable"})),
            )
        }
    }
}
