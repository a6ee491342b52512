//! Domain types for appointments and ratings.
//!
//! Value objects and entities shared by the reducer, the engine and every
//! storage adapter. Wire names are camelCase to match the HTTP contract.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an appointment
    AppointmentId
);
uuid_id!(
    /// Unique identifier for a listed product
    ProductId
);
uuid_id!(
    /// Unique identifier for a marketplace user (buyer or seller)
    UserId
);
uuid_id!(
    /// Unique identifier for a meeting point
    MeetingPointId
);
uuid_id!(
    /// Unique identifier for a rating
    RatingId
);

// ============================================================================
// Money
// ============================================================================

/// Amount in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates money from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiply by a quantity, `None` on overflow.
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Appointment
// ============================================================================

/// Lifecycle state of an appointment.
///
/// `Requested` is initial; `Completed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Buyer asked for the exchange, seller has not answered
    Requested,
    /// Seller accepted; stock has been decremented
    Confirmed,
    /// Both parties rated each other
    Completed,
    /// Rejected, expired or withdrawn
    Cancelled,
}

impl AppointmentStatus {
    /// Stable lowercase name, also used as the storage value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the appointment still occupies the seller's slot.
    #[must_use]
    pub const fn holds_slot(self) -> bool {
        matches!(self, Self::Requested | Self::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requested" => Ok(Self::Requested),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown appointment state: {other}")),
        }
    }
}

/// Why an appointment ended in `Cancelled`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancellationReason {
    /// Seller rejected the request
    Rejected {
        /// Seller-supplied explanation (never empty)
        note: String,
    },
    /// The window passed while still requested
    Expired,
    /// Reserved: buyer withdrew the request. No transition produces this yet.
    Withdrawn,
}

impl CancellationReason {
    /// Storage value of the reason kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Expired => "expired",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Rebuild a reason from its storage columns.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown kind or a rejection without a note.
    pub fn from_parts(kind: &str, note: Option<String>) -> Result<Self, String> {
        match (kind, note) {
            ("rejected", Some(note)) => Ok(Self::Rejected { note }),
            ("rejected", None) => Err("rejected cancellation without a note".to_string()),
            ("expired", _) => Ok(Self::Expired),
            ("withdrawn", _) => Ok(Self::Withdrawn),
            (other, _) => Err(format!("unknown cancellation reason: {other}")),
        }
    }

    /// Free-text note, only present for rejections.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Rejected { note } => Some(note),
            Self::Expired | Self::Withdrawn => None,
        }
    }
}

/// A scheduled, quantity- and price-bound exchange between one buyer and one
/// seller at one meeting point.
///
/// Everything except `status`, `cancellation_reason` and the three
/// timestamps is write-once at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Appointment ID
    pub id: AppointmentId,
    /// Product being exchanged
    pub product_id: ProductId,
    /// Buyer of record
    pub buyer_id: UserId,
    /// Seller of record
    pub seller_id: UserId,
    /// Where the exchange happens
    pub meeting_point_id: MeetingPointId,
    /// Day of the exchange (UTC)
    pub scheduled_date: NaiveDate,
    /// Time of the exchange (UTC)
    pub scheduled_time: NaiveTime,
    /// Units requested
    pub requested_quantity: u32,
    /// Unit price captured at request time
    pub unit_price_snapshot: Money,
    /// Current lifecycle state
    #[serde(rename = "state")]
    pub status: AppointmentStatus,
    /// Present only when cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<CancellationReason>,
    /// When the buyer requested
    pub requested_at: DateTime<Utc>,
    /// When the seller confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the second rating closed the appointment
    pub completed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// The exchange window as a single instant.
    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        scheduled_at(self.scheduled_date, self.scheduled_time)
    }

    /// `requested_quantity × unit_price_snapshot`, never stored.
    ///
    /// `None` only if the product overflows, which request validation
    /// rules out for every stored appointment.
    #[must_use]
    pub const fn total(&self) -> Option<Money> {
        self.unit_price_snapshot.checked_mul(self.requested_quantity)
    }

    /// Whether `user` is the buyer or the seller.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }
}

/// Combine a scheduled date and time into a UTC instant.
#[must_use]
pub fn scheduled_at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

// ============================================================================
// Ratings
// ============================================================================

/// Which party rates which.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingDirection {
    /// Buyer evaluates the seller
    BuyerToSeller,
    /// Seller evaluates the buyer
    SellerToBuyer,
}

impl RatingDirection {
    /// Both directions, in a fixed order.
    pub const ALL: [Self; 2] = [Self::BuyerToSeller, Self::SellerToBuyer];

    /// Stable snake_case name, also used as the storage value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuyerToSeller => "buyer_to_seller",
            Self::SellerToBuyer => "seller_to_buyer",
        }
    }

    /// The `(rater, rated)` pair an appointment expects for this direction.
    #[must_use]
    pub const fn parties(self, appointment: &Appointment) -> (UserId, UserId) {
        match self {
            Self::BuyerToSeller => (appointment.buyer_id, appointment.seller_id),
            Self::SellerToBuyer => (appointment.seller_id, appointment.buyer_id),
        }
    }
}

impl fmt::Display for RatingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatingDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer_to_seller" => Ok(Self::BuyerToSeller),
            "seller_to_buyer" => Ok(Self::SellerToBuyer),
            other => Err(format!("unknown rating direction: {other}")),
        }
    }
}

/// Rating score, always within `1..=5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    /// Lowest accepted score
    pub const MIN: u8 = 1;
    /// Highest accepted score
    pub const MAX: u8 = 5;

    /// The raw value
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "score must be between {} and {} (got {value})",
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// Longest accepted rating comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Largest quantity an appointment may request.
pub const MAX_REQUESTED_QUANTITY: u32 = i32::MAX.unsigned_abs();

/// Largest unit price snapshot, in cents.
pub const MAX_UNIT_PRICE_CENTS: u64 = i64::MAX.unsigned_abs();

/// One directional evaluation tied to a single appointment. Immutable once
/// written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    /// Rating ID
    pub id: RatingId,
    /// Appointment being rated
    pub appointment_id: AppointmentId,
    /// Who wrote the rating
    pub rater_id: UserId,
    /// Who is being rated
    pub rated_id: UserId,
    /// Buyer-of-seller or seller-of-buyer
    pub direction: RatingDirection,
    /// 1 to 5
    pub score: Score,
    /// Optional free text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the rating was written
    pub created_at: DateTime<Utc>,
}

/// Ratings received by one user.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    /// Whose reputation this is
    pub user_id: UserId,
    /// Restricts the count to one direction when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<RatingDirection>,
    /// Number of ratings received
    pub count: usize,
    /// Mean score, absent when there are no ratings
    pub average: Option<f64>,
}

impl Reputation {
    /// Aggregate a set of received ratings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_ratings(user_id: UserId, direction: Option<RatingDirection>, ratings: &[Rating]) -> Self {
        let count = ratings.len();
        let sum: u64 = ratings.iter().map(|r| u64::from(r.score.value())).sum();
        let average = (count > 0).then(|| sum as f64 / count as f64);
        Self {
            user_id,
            direction,
            count,
            average,
        }
    }
}

// ============================================================================
// Catalog data (consumed, not owned)
// ============================================================================

/// What the engine needs to know about a listed product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Product ID
    pub product_id: ProductId,
    /// Seller who owns the product
    pub seller_id: UserId,
    /// Meeting point the seller exchanges this product at
    pub meeting_point_id: MeetingPointId,
}

/// A recurring slot the seller publishes as available.
///
/// Covers `start..end` on `weekday`; the end is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityWindow {
    /// Day of week
    pub weekday: Weekday,
    /// First available time
    pub start: NaiveTime,
    /// First unavailable time
    pub end: NaiveTime,
}

impl AvailabilityWindow {
    /// Whether the window covers `time` on `weekday`.
    #[must_use]
    pub fn contains(&self, weekday: Weekday, time: NaiveTime) -> bool {
        self.weekday == weekday && self.start <= time && time < self.end
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which side of the appointment a listing is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Appointments the user requested
    Buyer,
    /// Appointments on the user's products
    Seller,
}

/// Filtered listing of one user's appointments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppointmentQuery {
    /// Buyer or seller side
    pub role: Role,
    /// Whose appointments
    pub user_id: UserId,
    /// Optional state filter
    pub status: Option<AppointmentStatus>,
}

impl AppointmentQuery {
    /// Whether `appointment` belongs in this listing.
    #[must_use]
    pub fn matches(&self, appointment: &Appointment) -> bool {
        let party = match self.role {
            Role::Buyer => appointment.buyer_id,
            Role::Seller => appointment.seller_id,
        };
        party == self.user_id && self.status.is_none_or(|s| s == appointment.status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn total_uses_checked_multiplication() {
        assert_eq!(Money::from_cents(1_250).checked_mul(3), Some(Money::from_cents(3_750)));
        assert_eq!(Money::from_cents(u64::MAX).checked_mul(2), None);
        assert_eq!(Money::from_cents(1_999).to_string(), "19.99");
    }

    #[test]
    fn score_rejects_out_of_range() {
        assert!(Score::try_from(0).is_err());
        assert!(Score::try_from(6).is_err());
        assert_eq!(Score::try_from(5).unwrap().value(), 5);
        assert!(serde_json::from_str::<Score>("7").is_err());
    }

    #[test]
    fn availability_end_is_exclusive() {
        let window = AvailabilityWindow {
            weekday: Weekday::Thu,
            start: time(9, 0),
            end: time(12, 0),
        };
        assert!(window.contains(Weekday::Thu, time(9, 0)));
        assert!(window.contains(Weekday::Thu, time(11, 59)));
        assert!(!window.contains(Weekday::Thu, time(12, 0)));
        assert!(!window.contains(Weekday::Fri, time(10, 0)));
    }

    #[test]
    fn status_round_trips_through_storage_name() {
        for status in [
            AppointmentStatus::Requested,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        assert!("pending".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn cancellation_reason_from_parts() {
        assert_eq!(
            CancellationReason::from_parts("rejected", Some("sold elsewhere".into())).unwrap(),
            CancellationReason::Rejected {
                note: "sold elsewhere".into()
            }
        );
        assert!(CancellationReason::from_parts("rejected", None).is_err());
        assert_eq!(
            CancellationReason::from_parts("expired", None).unwrap(),
            CancellationReason::Expired
        );
    }

    #[test]
    fn reputation_averages_scores() {
        let user = UserId::new();
        let rating = |score: u8| Rating {
            id: RatingId::new(),
            appointment_id: AppointmentId::new(),
            rater_id: UserId::new(),
            rated_id: user,
            direction: RatingDirection::BuyerToSeller,
            score: Score::try_from(score).unwrap(),
            comment: None,
            created_at: Utc::now(),
        };

        let reputation = Reputation::from_ratings(user, None, &[rating(4), rating(5)]);
        assert_eq!(reputation.count, 2);
        assert_eq!(reputation.average, Some(4.5));

        let empty = Reputation::from_ratings(user, None, &[]);
        assert_eq!(empty.average, None);
    }
}
