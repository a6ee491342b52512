use super::AppointmentAction;
use crate::error::EngineError;
use crate::types::{Appointment, AppointmentId, AppointmentStatus, AvailabilityWindow, Listing, Rating, RatingDirection};

/// Catalog data a request is validated against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// The product's listing, if it exists
    pub listing: Option<Listing>,
    /// Seller windows for the requested weekday
    pub availability: Vec<AvailabilityWindow>,
    /// Active appointment already occupying the seller's slot
    pub slot_holder: Option<AppointmentId>,
}

/// Loaded view of one appointment
#[derive(Clone, Debug, Default)]
pub struct LifecycleState {
    /// The appointment, absent before a request or if not found
    pub appointment: Option<Appointment>,
    /// Ratings written for it so far
    pub ratings: Vec<Rating>,
    /// Present while deciding a request
    pub request: Option<RequestContext>,
    /// Events applied but not yet persisted, in order
    pub pending: Vec<AppointmentAction>,
    /// Last guard failure
    pub last_error: Option<EngineError>,
}

impl LifecycleState {
    /// State for an existing appointment and its ratings
    #[must_use]
    pub const fn loaded(appointment: Option<Appointment>, ratings: Vec<Rating>) -> Self {
        Self {
            appointment,
            ratings,
            request: None,
            pending: Vec::new(),
            last_error: None,
        }
    }

    /// State for deciding a new request
    #[must_use]
    pub const fn for_request(context: RequestContext) -> Self {
        Self {
            appointment: None,
            ratings: Vec::new(),
            request: Some(context),
            pending: Vec::new(),
            last_error: None,
        }
    }

    /// Current lifecycle state, if an appointment is loaded
    #[must_use]
    pub fn status(&self) -> Option<AppointmentStatus> {
        self.appointment.as_ref().map(|a| a.status)
    }

    /// Whether a rating in `direction` exists
    #[must_use]
    pub fn has_rating(&self, direction: RatingDirection) -> bool {
        self.ratings.iter().any(|r| r.direction == direction)
    }

    /// Closure condition: one rating in each direction
    #[must_use]
    pub fn both_rated(&self) -> bool {
        RatingDirection::ALL.iter().all(|d| self.has_rating(*d))
    }

    /// Drain the events waiting to be persisted
    pub fn take_pending(&mut self) -> Vec<AppointmentAction> {
        std::mem::take(&mut self.pending)
    }
}
