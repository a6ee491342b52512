//! Error taxonomy for the engine and its storage ports.

use crate::types::{AppointmentId, AppointmentStatus, ProductId, RatingDirection, UserId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend could not be reached (pool exhausted, connection refused).
    /// The only transient variant; adapters retry reads on it.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed the statement
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded into a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A uniqueness constraint was violated
    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

impl StorageError {
    /// Whether retrying the same read may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors raised while delivering a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// Emitter could not be constructed
    #[error("Notification emitter misconfigured: {0}")]
    Config(String),

    /// Request never reached the receiver
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Receiver answered with a non-success status
    #[error("Notification rejected with status {status}")]
    Rejected {
        /// HTTP status code
        status: u16,
    },
}

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; fix and resend
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Actor is not a party allowed to do this
    Forbidden,
    /// State does not permit the operation; refetch before retrying
    Conflict,
    /// Infrastructure failure
    System,
}

/// Errors returned by [`AppointmentEngine`](crate::engine::AppointmentEngine)
/// operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Input rejected before touching state
    #[error("{0}")]
    Validation(String),

    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Actor is not allowed to act on this appointment
    #[error("{0}")]
    Forbidden(String),

    /// Current state has no edge for the attempted operation
    #[error("Cannot {attempted} an appointment that is {from}")]
    InvalidTransition {
        /// State the appointment is actually in
        from: AppointmentStatus,
        /// Operation that was attempted
        attempted: &'static str,
    },

    /// Not enough stock left to confirm
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product being confirmed
        product_id: ProductId,
        /// Units the appointment needs
        requested: u32,
        /// Units left in the ledger
        available: u32,
    },

    /// This direction was already rated
    #[error("A {direction} rating already exists for appointment {appointment_id}")]
    DuplicateRating {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// Direction already rated
        direction: RatingDirection,
    },

    /// Appointment is not in a state that accepts ratings
    #[error("{0}")]
    RatingNotAllowed(String),

    /// Seller already holds an active appointment at this instant
    #[error("Seller {seller_id} already has an appointment at {scheduled_at}")]
    SlotTaken {
        /// Seller of the product
        seller_id: UserId,
        /// Requested instant
        scheduled_at: DateTime<Utc>,
    },

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Shorthand for a missing appointment.
    #[must_use]
    pub fn appointment_not_found(id: AppointmentId) -> Self {
        Self::NotFound {
            entity: "appointment",
            id: id.to_string(),
        }
    }

    /// Error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidTransition { .. }
            | Self::InsufficientStock { .. }
            | Self::DuplicateRating { .. }
            | Self::RatingNotAllowed(_)
            | Self::SlotTaken { .. } => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::System,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::DuplicateRating { .. } => "DUPLICATE_RATING",
            Self::RatingNotAllowed(_) => "RATING_NOT_ALLOWED",
            Self::SlotTaken { .. } => "SLOT_TAKEN",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}
