//! Route table.

use crate::handlers::{appointments, health, ratings};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// ```text
/// POST /appointments
/// GET  /appointments?role=&userId=&state=
/// GET  /appointments/:id
/// PUT  /appointments/:id/confirm
/// PUT  /appointments/:id/reject
/// POST /ratings
/// GET  /users/:id/reputation
/// GET  /health
/// GET  /ready
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/appointments",
            post(appointments::create_appointment).get(appointments::list_appointments),
        )
        .route("/appointments/:id", get(appointments::get_appointment))
        .route("/appointments/:id/confirm", put(appointments::confirm_appointment))
        .route("/appointments/:id/reject", put(appointments::reject_appointment))
        .route("/ratings", post(ratings::submit_rating))
        .route("/users/:id/reputation", get(ratings::get_reputation))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
