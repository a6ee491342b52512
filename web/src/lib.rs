//! HTTP surface for the meetpoint appointment engine.
//!
//! Handlers are thin: extract, hand to [`AppointmentEngine`], map the
//! result. Every rule lives in the engine.
//!
//! # Request Flow
//!
//! 1. Correlation ID middleware tags the request span
//! 2. Extractors read the caller (`X-User-Id`), path, query and body
//! 3. The handler calls one engine operation
//! 4. [`AppError`] maps engine errors onto status codes
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(Arc::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(state)).await?;
//! ```
//!
//! [`AppointmentEngine`]: meetpoint_appointments::AppointmentEngine

#![allow(clippy::module_name_repetitions)]

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{ACTOR_HEADER, ActorId, CorrelationId, ValidJson, ValidPath, ValidQuery};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
