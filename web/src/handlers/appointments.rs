//! Appointment endpoints.

use crate::dto::{CreateAppointmentRequest, ListQuery, RejectRequest, ensure_caller};
use crate::error::AppError;
use crate::extractors::{ActorId, CorrelationId, ValidJson, ValidPath, ValidQuery};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use meetpoint_appointments::{Appointment, AppointmentDetail, AppointmentId, AppointmentQuery};

/// `POST /appointments`
///
/// # Errors
///
/// `403` when `buyerId` is not the caller, otherwise the engine's error.
pub async fn create_appointment(
    State(state): State<AppState>,
    ActorId(actor): ActorId,
    CorrelationId(correlation_id): CorrelationId,
    ValidJson(body): ValidJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    ensure_caller(actor, body.buyer_id, "buyerId")?;
    let appointment = state.engine.request(body.into()).await?;
    tracing::info!(%correlation_id, appointment_id = %appointment.id, "Appointment requested over HTTP");
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// `GET /appointments?role=buyer|seller&userId=&state=`
///
/// # Errors
///
/// Storage failures only.
pub async fn list_appointments(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = state.engine.list(&AppointmentQuery::from(query)).await?;
    Ok(Json(appointments))
}

/// `GET /appointments/:id`
///
/// # Errors
///
/// `404` for an unknown appointment.
pub async fn get_appointment(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<AppointmentId>,
) -> Result<Json<AppointmentDetail>, AppError> {
    Ok(Json(state.engine.get(id).await?))
}

/// `PUT /appointments/:id/confirm`
///
/// # Errors
///
/// `409` with `INSUFFICIENT_STOCK` or `INVALID_TRANSITION`, `403` for
/// anyone but the seller.
pub async fn confirm_appointment(
    State(state): State<AppState>,
    ActorId(actor): ActorId,
    ValidPath(id): ValidPath<AppointmentId>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.engine.confirm(id, actor).await?))
}

/// `PUT /appointments/:id/reject`
///
/// # Errors
///
/// `400` for an empty reason, `409` outside `requested`.
pub async fn reject_appointment(
    State(state): State<AppState>,
    ActorId(actor): ActorId,
    ValidPath(id): ValidPath<AppointmentId>,
    ValidJson(body): ValidJson<RejectRequest>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.engine.reject(id, actor, body.reason).await?))
}
