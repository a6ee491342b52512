//! Request bodies and query strings.
//!
//! Wire names are camelCase. Each DTO converts into the engine's input type
//! so handlers stay one-liners.

use crate::error::AppError;
use chrono::{NaiveDate, NaiveTime};
use meetpoint_appointments::{
    AppointmentId, AppointmentQuery, AppointmentStatus, Money, NewAppointment, NewRating, ProductId,
    RatingDirection, Role, UserId,
};
use serde::{Deserialize, Deserializer};

/// `POST /appointments`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    /// Product to exchange
    pub product_id: ProductId,
    /// Buyer; must be the caller
    pub buyer_id: UserId,
    /// `YYYY-MM-DD`
    pub scheduled_date: NaiveDate,
    /// `HH:MM` or `HH:MM:SS`
    #[serde(deserialize_with = "clock_time")]
    pub scheduled_time: NaiveTime,
    /// Units wanted
    pub requested_quantity: u32,
    /// Unit price in cents
    pub unit_price_snapshot: Money,
}

impl From<CreateAppointmentRequest> for NewAppointment {
    fn from(req: CreateAppointmentRequest) -> Self {
        Self {
            product_id: req.product_id,
            buyer_id: req.buyer_id,
            scheduled_date: req.scheduled_date,
            scheduled_time: req.scheduled_time,
            requested_quantity: req.requested_quantity,
            unit_price_snapshot: req.unit_price_snapshot,
        }
    }
}

fn clock_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_clock_time(&raw).map_err(serde::de::Error::custom)
}

/// Parse `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns a message naming the rejected value.
pub fn parse_clock_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("invalid time {raw:?}, expected HH:MM"))
}

/// `PUT /appointments/:id/reject`
#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    /// Why the seller declined
    #[serde(default)]
    pub reason: String,
}

/// `GET /appointments?role=&userId=&state=`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// `buyer` or `seller`
    pub role: Role,
    /// Whose appointments
    pub user_id: UserId,
    /// Optional lifecycle filter
    pub state: Option<AppointmentStatus>,
}

impl From<ListQuery> for AppointmentQuery {
    fn from(q: ListQuery) -> Self {
        Self {
            role: q.role,
            user_id: q.user_id,
            status: q.state,
        }
    }
}

/// `POST /ratings`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    /// Appointment being rated
    pub appointment_id: AppointmentId,
    /// Author; must be the caller
    pub rater_id: UserId,
    /// Counterparty
    pub rated_id: UserId,
    /// `buyer_to_seller` or `seller_to_buyer`
    pub direction: RatingDirection,
    /// 1 to 5
    pub score: u8,
    /// Optional free text
    #[serde(default)]
    pub comment: Option<String>,
}

impl From<SubmitRatingRequest> for NewRating {
    fn from(req: SubmitRatingRequest) -> Self {
        Self {
            appointment_id: req.appointment_id,
            rater_id: req.rater_id,
            rated_id: req.rated_id,
            direction: req.direction,
            score: req.score,
            comment: req.comment,
        }
    }
}

/// `GET /users/:id/reputation?direction=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReputationQuery {
    /// Restrict to ratings of one direction
    pub direction: Option<RatingDirection>,
}

/// Reject a body that names someone other than the caller.
///
/// # Errors
///
/// `403` when `claimed` differs from `actor`.
pub fn ensure_caller(actor: UserId, claimed: UserId, field: &str) -> Result<(), AppError> {
    if actor == claimed {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("{field} must be the authenticated user")))
    }
}
