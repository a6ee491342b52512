//! Application state for Axum handlers.

use meetpoint_appointments::AppointmentEngine;
use std::sync::Arc;

/// State shared by every HTTP handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The appointment engine
    pub engine: Arc<AppointmentEngine>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(engine: Arc<AppointmentEngine>) -> Self {
        Self { engine }
    }
}
