//! Commands and events of the appointment lifecycle.

use crate::error::EngineError;
use crate::types::{Appointment, AppointmentId, Money, ProductId, Rating, RatingId, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Actions for the appointment lifecycle
///
/// Commands are validated by the reducer; events are what it records after a
/// command passed every guard.
#[derive(Clone, Debug, PartialEq)]
pub enum AppointmentAction {
    // Commands
    /// Buyer asks for an exchange slot
    RequestAppointment {
        /// ID assigned by the caller
        appointment_id: AppointmentId,
        /// Product to exchange
        product_id: ProductId,
        /// Buyer making the request
        buyer_id: UserId,
        /// Day of the exchange
        scheduled_date: NaiveDate,
        /// Time of the exchange
        scheduled_time: NaiveTime,
        /// Units wanted
        requested_quantity: u32,
        /// Unit price the buyer saw
        unit_price_snapshot: Money,
    },

    /// Seller accepts a requested appointment
    ConfirmAppointment {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// Who is confirming
        actor: UserId,
    },

    /// Seller declines a requested appointment
    RejectAppointment {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// Who is rejecting
        actor: UserId,
        /// Why (must not be blank)
        reason: String,
    },

    /// System cancels a requested appointment whose window passed
    ExpireAppointment {
        /// Appointment ID
        appointment_id: AppointmentId,
    },

    /// One party rates the other
    SubmitRating {
        /// ID assigned by the caller
        rating_id: RatingId,
        /// Appointment being rated
        appointment_id: AppointmentId,
        /// Who is submitting
        actor: UserId,
        /// Claimed rater
        rater_id: UserId,
        /// Claimed rated party
        rated_id: UserId,
        /// Direction of the rating
        direction: crate::types::RatingDirection,
        /// Raw score, validated into `Score`
        score: u8,
        /// Optional comment
        comment: Option<String>,
    },

    /// Close a confirmed appointment that holds both ratings
    CompleteAppointment {
        /// Appointment ID
        appointment_id: AppointmentId,
    },

    // Events
    /// Appointment was created in `Requested`
    AppointmentRequested {
        /// The new appointment
        appointment: Appointment,
    },

    /// Seller confirmed; stock must be decremented with this transition
    AppointmentConfirmed {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// Product whose stock is taken
        product_id: ProductId,
        /// Units taken
        quantity: u32,
        /// When confirmed
        confirmed_at: DateTime<Utc>,
    },

    /// Seller rejected
    AppointmentRejected {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// Trimmed reason
        reason: String,
        /// When rejected
        rejected_at: DateTime<Utc>,
    },

    /// Window lapsed without confirmation
    AppointmentExpired {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// When expired
        expired_at: DateTime<Utc>,
    },

    /// A rating was accepted
    RatingSubmitted {
        /// The rating
        rating: Rating,
    },

    /// Both ratings exist; appointment closed
    AppointmentCompleted {
        /// Appointment ID
        appointment_id: AppointmentId,
        /// When completed
        completed_at: DateTime<Utc>,
    },

    /// A command failed a guard
    CommandFailed {
        /// Why
        error: EngineError,
    },
}

impl AppointmentAction {
    /// Whether this action is an event (as opposed to a command).
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !matches!(
            self,
            Self::RequestAppointment { .. }
                | Self::ConfirmAppointment { .. }
                | Self::RejectAppointment { .. }
                | Self::ExpireAppointment { .. }
                | Self::SubmitRating { .. }
                | Self::CompleteAppointment { .. }
        )
    }
}
