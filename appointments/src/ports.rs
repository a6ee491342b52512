//! Ports the engine talks to.
//!
//! Each trait is implemented in memory by [`crate::memory`] and against
//! PostgreSQL by the `meetpoint-postgres` crate. The engine holds them as
//! `Arc<dyn Trait>` so backends are chosen at start-up.

use crate::error::{NotificationError, StorageError};
use crate::types::{
    Appointment, AppointmentId, AppointmentQuery, AppointmentStatus, AvailabilityWindow, Listing,
    ProductId, Rating, RatingDirection, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Result of an atomic check-and-subtract on the stock ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was taken
    Applied {
        /// Units left after the decrement
        remaining: u32,
    },
    /// Not enough units; nothing changed
    Insufficient {
        /// Units currently available
        available: u32,
    },
}

/// Per-product available quantity.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Units currently available. Unknown products have none.
    async fn available(&self, product_id: ProductId) -> Result<u32, StorageError>;

    /// Subtract `quantity` if at least that much is available, as one
    /// atomic step with respect to every other caller.
    async fn try_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockDecrement, StorageError>;

    /// Give back units taken by a decrement whose transition did not commit.
    async fn restore(&self, product_id: ProductId, quantity: u32) -> Result<(), StorageError>;
}

/// Durable record of every appointment.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Write a new appointment.
    ///
    /// Fails with [`StorageError::Duplicate`] when the id exists or the
    /// seller already holds an active appointment at the same instant.
    async fn insert(&self, appointment: &Appointment) -> Result<(), StorageError>;

    /// Fetch one appointment.
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError>;

    /// Appointments matching `query`, earliest window first.
    async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StorageError>;

    /// Up to `limit` appointments in `status` whose window is at or before
    /// `cutoff`, earliest first.
    async fn due(
        &self,
        status: AppointmentStatus,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Appointment>, StorageError>;

    /// Number of appointments in `status` whose window is at or before
    /// `cutoff`.
    async fn count_due(&self, status: AppointmentStatus, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// The seller's active appointment at `scheduled_at`, if any.
    async fn active_at_slot(
        &self,
        seller_id: UserId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Option<AppointmentId>, StorageError>;

    /// Replace the mutable fields of `next` only if the stored state still
    /// equals `expected`. Returns whether the write happened.
    async fn compare_and_set(
        &self,
        expected: AppointmentStatus,
        next: &Appointment,
    ) -> Result<bool, StorageError>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Durable, append-only record of ratings.
#[async_trait]
pub trait RatingLedger: Send + Sync {
    /// Write a rating. Fails with [`StorageError::Duplicate`] when the
    /// appointment already has a rating in that direction.
    async fn insert(&self, rating: &Rating) -> Result<(), StorageError>;

    /// Write the rating that closes an appointment and move the appointment
    /// from `Confirmed` to `completed`, both or neither. Returns `false`,
    /// with nothing written, when the appointment is no longer `Confirmed`.
    ///
    /// Fails with [`StorageError::Duplicate`] like [`RatingLedger::insert`].
    async fn insert_closing(&self, rating: &Rating, completed: &Appointment) -> Result<bool, StorageError>;

    /// Up to `limit` `Confirmed` appointments that already hold a rating in
    /// both directions, earliest window first.
    async fn closable(&self, limit: usize) -> Result<Vec<AppointmentId>, StorageError>;

    /// Ratings for one appointment (zero, one or two).
    async fn for_appointment(&self, appointment_id: AppointmentId) -> Result<Vec<Rating>, StorageError>;

    /// Ratings received by `user`, optionally in one direction, newest first.
    async fn received_by(
        &self,
        user_id: UserId,
        direction: Option<RatingDirection>,
    ) -> Result<Vec<Rating>, StorageError>;
}

/// Read-only view of the product catalog and seller availability.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Listing details for a product.
    async fn listing(&self, product_id: ProductId) -> Result<Option<Listing>, StorageError>;

    /// Windows the seller publishes for one weekday.
    async fn availability(
        &self,
        seller_id: UserId,
        weekday: Weekday,
    ) -> Result<Vec<AvailabilityWindow>, StorageError>;
}

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A buyer requested an appointment on the seller's product
    AppointmentRequested,
    /// The seller confirmed
    AppointmentConfirmed,
    /// The seller rejected
    AppointmentRejected {
        /// Seller-supplied note
        reason: String,
    },
    /// The window lapsed unconfirmed
    AppointmentExpired,
    /// The counterpart rated the recipient
    RatingReceived {
        /// Direction of the rating
        direction: RatingDirection,
        /// Score given
        score: u8,
    },
    /// Both ratings are in
    AppointmentCompleted,
}

/// One notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentNotification {
    /// Appointment the notification is about
    pub appointment_id: AppointmentId,
    /// Who should be told
    pub recipient: UserId,
    /// What happened
    pub kind: NotificationKind,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget notification sink.
///
/// Delivery is at-least-once and best-effort; a failure never affects the
/// transition that produced the notification.
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    /// Deliver one notification.
    async fn emit(&self, notification: &AppointmentNotification) -> Result<(), NotificationError>;
}
