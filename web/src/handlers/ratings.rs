//! Rating and reputation endpoints.

use crate::dto::{ReputationQuery, SubmitRatingRequest, ensure_caller};
use crate::error::AppError;
use crate::extractors::{ActorId, ValidJson, ValidPath, ValidQuery};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use meetpoint_appointments::{RatingReceipt, Reputation, UserId};

/// `POST /ratings`
///
/// The receipt carries `appointmentCompleted` so the caller can update
/// its view without refetching.
///
/// # Errors
///
/// `403` when `raterId` is not the caller, `409` for duplicates or an
/// appointment that is not confirmed.
pub async fn submit_rating(
    State(state): State<AppState>,
    ActorId(actor): ActorId,
    ValidJson(body): ValidJson<SubmitRatingRequest>,
) -> Result<(StatusCode, Json<RatingReceipt>), AppError> {
    ensure_caller(actor, body.rater_id, "raterId")?;
    let receipt = state.engine.submit_rating(actor, body.into()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /users/:id/reputation`
///
/// # Errors
///
/// Storage failures only.
pub async fn get_reputation(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<UserId>,
    ValidQuery(query): ValidQuery<ReputationQuery>,
) -> Result<Json<Reputation>, AppError> {
    Ok(Json(state.engine.reputation(user_id, query.direction).await?))
}
