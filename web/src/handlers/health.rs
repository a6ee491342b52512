//! Health check endpoints.
//!
//! `/health` answers as long as the process runs; `/ready` also probes
//! storage so load balancers stop routing to an instance that lost its
//! database.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use meetpoint_runtime::{HealthCheck, HealthReport};
use std::time::{Duration, Instant};

/// A store ping slower than this reports `degraded`.
const PING_BUDGET: Duration = Duration::from_millis(500);

/// Liveness.
///
/// ```text
/// GET /health -> 200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let started = Instant::now();
    let outcome = state.engine.ping().await;
    if let Err(err) = &outcome {
        tracing::warn!(error = %err, "Readiness probe failed");
    }
    let storage = HealthCheck::grade("appointment_store", outcome, started.elapsed(), PING_BUDGET);
    let report = HealthReport::new(vec![storage]);

    let status = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}
