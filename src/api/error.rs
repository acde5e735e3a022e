//! HTTP error envelope.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::fmt;

use crate::EcommerceError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    /// Logged for server errors, never sent.
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), detail: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message) }

    pub fn unauthorized(message: impl Into<String>) -> Self { Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message) }

    pub fn validation(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message) }

    pub fn not_found(message: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message) }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn code(&self) -> &'static str { self.code }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "[{}] {}", self.code, self.message) }
}

impl From<EcommerceError> for ApiError {
    fn from(err: EcommerceError) -> Self {
        match err {
            EcommerceError::NotFound { .. } => Self::not_found(err.to_string()),
            EcommerceError::Validation(msg) => Self::validation(msg),
            EcommerceError::EmptyCart => Self::new(StatusCode::BAD_REQUEST, "EMPTY_CART", "Cart is empty."),
            EcommerceError::InsufficientStock { .. } => Self::new(StatusCode::BAD_REQUEST, "INSUFFICIENT_STOCK", err.to_string()),
            EcommerceError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", "The request conflicted with a concurrent update; retry it.")
                    .with_detail(err.to_string())
            }
            EcommerceError::Storage(detail) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", "An internal error occurred.").with_detail(detail)
            }
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self { Self::bad_request(format!("Invalid path parameter: {}", rejection.body_text())) }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self { Self::bad_request(format!("Invalid query string: {}", rejection.body_text())) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, detail = self.detail.as_deref().unwrap_or(""), "request failed");
        } else if let Some(detail) = &self.detail {
            tracing::warn!(status = %self.status, code = self.code, detail = %detail, "request rejected");
        }

        let body = json!({
            "success": false,
            "error": { "code": self.code, "message": self.message },
            "timestamp": Utc::now(),
        });
        (self.status, Json(body)).into_response()
    }
}
