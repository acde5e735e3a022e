//! Request extractors.

use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::error::ApiError;
use crate::domain::value_objects::UserId;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity from `X-User-Id`, already authenticated upstream.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header."))?
            .to_str()
            .map_err(|_| ApiError::bad_request("Invalid X-User-Id header: must be a positive integer."))?;
        raw.trim()
            .parse::<UserId>()
            .map(Self)
            .map_err(|_| ApiError::bad_request("Invalid X-User-Id header: must be a positive integer."))
    }
}

/// JSON body that has passed its `validator` rules.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| ApiError::bad_request(e.body_text()))?;
        value.validate().map_err(|e| ApiError::validation(e.to_string()))?;
        Ok(Self(value))
    }
}

/// `Path` whose rejection uses the error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Query` whose rejection uses the error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
