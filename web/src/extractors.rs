//! Custom Axum extractors.
//!
//! - `ActorId`: the authenticated user making the call, from `X-User-Id`
//! - `CorrelationId`: the request's correlation ID, set by the middleware
//! - `ValidJson`, `ValidQuery`, `ValidPath`: axum's extractors with
//!   rejections rendered as `400 VALIDATION_ERROR`
//!
//! Actor identity is always an explicit handler parameter; nothing reads
//! it from ambient state.

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use meetpoint_appointments::UserId;
use uuid::Uuid;

/// Header carrying the caller's user ID, set by the upstream gateway.
pub const ACTOR_HEADER: &str = "X-User-Id";

/// The user performing the request.
///
/// Rejects with `401` when the header is missing or not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {ACTOR_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|id| Self(UserId::from_uuid(id)))
            .ok_or_else(|| AppError::unauthorized(format!("Invalid {ACTOR_HEADER} header")))
    }
}

/// Correlation ID for request tracing.
///
/// Read from the request extensions when the middleware ran, otherwise
/// from the `X-Correlation-ID` header, otherwise freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }
        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// JSON body.
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ValidJson<T>(pub T);

/// Query string.
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ValidQuery<T>(pub T);

/// Path parameters.
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ValidPath<T>(pub T);
