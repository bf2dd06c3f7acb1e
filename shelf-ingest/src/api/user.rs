//! Caller identity extractor

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user id taken from the `x-user-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?;

        let text = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))?;

        Uuid::parse_str(text.trim())
            .map(UserId)
            .map_err(|_| ApiError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))
    }
}
