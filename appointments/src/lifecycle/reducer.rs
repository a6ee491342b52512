use super::{AppointmentAction, LifecycleEnvironment, LifecycleState};
use crate::error::EngineError;
use crate::notify::deliver;
use crate::ports::{AppointmentNotification, NotificationKind};
use crate::types::{
    Appointment, AppointmentId, AppointmentStatus, CancellationReason, MAX_COMMENT_CHARS,
    MAX_REQUESTED_QUANTITY, MAX_UNIT_PRICE_CENTS, Rating, RatingDirection, Score, UserId, scheduled_at,
};
use chrono::{DateTime, Datelike, Utc};
use meetpoint_core::{SmallVec, async_effect, effect::Effect, reducer::Reducer, smallvec};
use std::sync::Arc;

type Effects = SmallVec<[Effect<AppointmentAction>; 4]>;

/// Reducer for the appointment lifecycle
///
/// Edges: `Requested → Confirmed → Completed` and
/// `Requested → Cancelled` (rejected or expired). Nothing leaves a
/// terminal state.
#[derive(Clone, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new `LifecycleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn loaded(state: &LifecycleState, id: AppointmentId) -> Result<&Appointment, EngineError> {
        state
            .appointment
            .as_ref()
            .filter(|a| a.id == id)
            .ok_or_else(|| EngineError::appointment_not_found(id))
    }

    fn require_status(
        appointment: &Appointment,
        expected: AppointmentStatus,
        attempted: &'static str,
    ) -> Result<(), EngineError> {
        if appointment.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: appointment.status,
                attempted,
            })
        }
    }

    fn require_seller(appointment: &Appointment, actor: UserId, attempted: &str) -> Result<(), EngineError> {
        if appointment.seller_id == actor {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "Only the seller of record may {attempted} appointment {}",
                appointment.id
            )))
        }
    }

    /// Validates `RequestAppointment` and builds the new appointment
    fn validate_request(
        state: &LifecycleState,
        action: &AppointmentAction,
        now: DateTime<Utc>,
    ) -> Result<Appointment, EngineError> {
        let AppointmentAction::RequestAppointment {
            appointment_id,
            product_id,
            buyer_id,
            scheduled_date,
            scheduled_time,
            requested_quantity,
            unit_price_snapshot,
        } = action
        else {
            return Err(EngineError::Validation("not a request".to_string()));
        };

        if *requested_quantity == 0 {
            return Err(EngineError::Validation(
                "Requested quantity must be at least 1".to_string(),
            ));
        }
        if *requested_quantity > MAX_REQUESTED_QUANTITY {
            return Err(EngineError::Validation(format!(
                "Requested quantity must be at most {MAX_REQUESTED_QUANTITY}"
            )));
        }
        if unit_price_snapshot.cents() > MAX_UNIT_PRICE_CENTS {
            return Err(EngineError::Validation(format!(
                "Unit price must be at most {MAX_UNIT_PRICE_CENTS} cents"
            )));
        }

        let context = state.request.as_ref().ok_or_else(|| {
            EngineError::Validation("Request context was not loaded".to_string())
        })?;
        let listing = context.listing.as_ref().ok_or_else(|| EngineError::NotFound {
            entity: "product",
            id: product_id.to_string(),
        })?;

        if listing.seller_id == *buyer_id {
            return Err(EngineError::Validation(
                "A seller cannot request an appointment on their own product".to_string(),
            ));
        }

        let at = scheduled_at(*scheduled_date, *scheduled_time);
        if at <= now {
            return Err(EngineError::Validation(format!(
                "Scheduled window {at} is not in the future"
            )));
        }

        let weekday = scheduled_date.weekday();
        if !context
            .availability
            .iter()
            .any(|w| w.contains(weekday, *scheduled_time))
        {
            return Err(EngineError::Validation(format!(
                "{weekday} {scheduled_time} is outside the seller's availability"
            )));
        }

        if unit_price_snapshot.checked_mul(*requested_quantity).is_none() {
            return Err(EngineError::Validation(
                "Appointment total is too large".to_string(),
            ));
        }

        if context.slot_holder.is_some() {
            return Err(EngineError::SlotTaken {
                seller_id: listing.seller_id,
                scheduled_at: at,
            });
        }

        Ok(Appointment {
            id: *appointment_id,
            product_id: *product_id,
            buyer_id: *buyer_id,
            seller_id: listing.seller_id,
            meeting_point_id: listing.meeting_point_id,
            scheduled_date: *scheduled_date,
            scheduled_time: *scheduled_time,
            requested_quantity: *requested_quantity,
            unit_price_snapshot: *unit_price_snapshot,
            status: AppointmentStatus::Requested,
            cancellation_reason: None,
            requested_at: now,
            confirmed_at: None,
            completed_at: None,
        })
    }

    /// Validates `SubmitRating` and builds the rating
    fn validate_rating(
        state: &LifecycleState,
        action: &AppointmentAction,
        env: &LifecycleEnvironment,
        now: DateTime<Utc>,
    ) -> Result<Rating, EngineError> {
        let AppointmentAction::SubmitRating {
            rating_id,
            appointment_id,
            actor,
            rater_id,
            rated_id,
            direction,
            score,
            comment,
        } = action
        else {
            return Err(EngineError::Validation("not a rating".to_string()));
        };

        let score = Score::try_from(*score).map_err(EngineError::Validation)?;
        let comment = comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
        {
            return Err(EngineError::Validation(format!(
                "Comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        let appointment = Self::loaded(state, *appointment_id)?;

        let (expected_rater, expected_rated) = direction.parties(appointment);
        if *actor != *rater_id || *rater_id != expected_rater || *rated_id != expected_rated {
            return Err(EngineError::Forbidden(format!(
                "Only the {} of appointment {appointment_id} may submit a {direction} rating",
                match direction {
                    RatingDirection::BuyerToSeller => "buyer",
                    RatingDirection::SellerToBuyer => "seller",
                }
            )));
        }

        match appointment.status {
            AppointmentStatus::Requested | AppointmentStatus::Cancelled => {
                return Err(EngineError::RatingNotAllowed(format!(
                    "Appointment {appointment_id} is {} and cannot be rated",
                    appointment.status
                )));
            },
            AppointmentStatus::Confirmed | AppointmentStatus::Completed => {},
        }

        if state.has_rating(*direction) {
            return Err(EngineError::DuplicateRating {
                appointment_id: *appointment_id,
                direction: *direction,
            });
        }

        if appointment.status != AppointmentStatus::Confirmed {
            return Err(EngineError::RatingNotAllowed(format!(
                "Appointment {appointment_id} is {} and cannot be rated",
                appointment.status
            )));
        }

        if env.settings.rating_requires_elapsed_window && now < appointment.scheduled_at() {
            return Err(EngineError::RatingNotAllowed(format!(
                "Appointment {appointment_id} can be rated after {}",
                appointment.scheduled_at()
            )));
        }

        Ok(Rating {
            id: *rating_id,
            appointment_id: *appointment_id,
            rater_id: *rater_id,
            rated_id: *rated_id,
            direction: *direction,
            score,
            comment,
            created_at: now,
        })
    }

    /// Applies an event to state and queues it for persistence
    fn apply_event(state: &mut LifecycleState, event: AppointmentAction) {
        match &event {
            AppointmentAction::AppointmentRequested { appointment } => {
                state.appointment = Some(appointment.clone());
                state.last_error = None;
            },
            AppointmentAction::AppointmentConfirmed { confirmed_at, .. } => {
                if let Some(appointment) = state.appointment.as_mut() {
                    appointment.status = AppointmentStatus::Confirmed;
                    appointment.confirmed_at = Some(*confirmed_at);
                }
                state.last_error = None;
            },
            AppointmentAction::AppointmentRejected { reason, .. } => {
                if let Some(appointment) = state.appointment.as_mut() {
                    appointment.status = AppointmentStatus::Cancelled;
                    appointment.cancellation_reason = Some(CancellationReason::Rejected {
                        note: reason.clone(),
                    });
                }
                state.last_error = None;
            },
            AppointmentAction::AppointmentExpired { .. } => {
                if let Some(appointment) = state.appointment.as_mut() {
                    appointment.status = AppointmentStatus::Cancelled;
                    appointment.cancellation_reason = Some(CancellationReason::Expired);
                }
                state.last_error = None;
            },
            AppointmentAction::RatingSubmitted { rating } => {
                state.ratings.push(rating.clone());
                state.last_error = None;
            },
            AppointmentAction::AppointmentCompleted { completed_at, .. } => {
                if let Some(appointment) = state.appointment.as_mut() {
                    appointment.status = AppointmentStatus::Completed;
                    appointment.completed_at = Some(*completed_at);
                }
                state.last_error = None;
            },
            AppointmentAction::CommandFailed { error } => {
                state.last_error = Some(error.clone());
                return;
            },
            // Commands don't modify state
            AppointmentAction::RequestAppointment { .. }
            | AppointmentAction::ConfirmAppointment { .. }
            | AppointmentAction::RejectAppointment { .. }
            | AppointmentAction::ExpireAppointment { .. }
            | AppointmentAction::SubmitRating { .. }
            | AppointmentAction::CompleteAppointment { .. } => return,
        }
        state.pending.push(event);
    }

    fn fail(state: &mut LifecycleState, error: EngineError) -> Effects {
        Self::apply_event(state, AppointmentAction::CommandFailed { error });
        SmallVec::new()
    }

    /// One delivery effect per recipient
    fn notify(
        env: &LifecycleEnvironment,
        appointment_id: AppointmentId,
        recipients: &[UserId],
        kind: &NotificationKind,
        occurred_at: DateTime<Utc>,
    ) -> Effect<AppointmentAction> {
        let deliveries = recipients
            .iter()
            .map(|recipient| {
                let emitter = Arc::clone(&env.emitter);
                let policy = env.notification_retry.clone();
                let notification = AppointmentNotification {
                    appointment_id,
                    recipient: *recipient,
                    kind: kind.clone(),
                    occurred_at,
                };
                async_effect! {
                    deliver(emitter, notification, policy).await;
                    None
                }
            })
            .collect();
        Effect::merge(deliveries)
    }

    /// Applies `AppointmentCompleted` if the loaded ratings close the
    /// appointment. Returns the completion notification, if any.
    fn close_if_rated(
        state: &mut LifecycleState,
        env: &LifecycleEnvironment,
        now: DateTime<Utc>,
    ) -> Option<Effect<AppointmentAction>> {
        let appointment = state.appointment.as_ref()?;
        if appointment.status != AppointmentStatus::Confirmed || !state.both_rated() {
            return None;
        }
        let (id, buyer, seller) = (appointment.id, appointment.buyer_id, appointment.seller_id);
        Self::apply_event(
            state,
            AppointmentAction::AppointmentCompleted {
                appointment_id: id,
                completed_at: now,
            },
        );
        Some(Self::notify(
            env,
            id,
            &[buyer, seller],
            &NotificationKind::AppointmentCompleted,
            now,
        ))
    }
}

impl Reducer for LifecycleReducer {
    type State = LifecycleState;
    type Action = AppointmentAction;
    type Environment = LifecycleEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();

        match action {
            AppointmentAction::RequestAppointment { .. } => {
                let appointment = match Self::validate_request(state, &action, now) {
                    Ok(appointment) => appointment,
                    Err(error) => return Self::fail(state, error),
                };
                let (id, seller) = (appointment.id, appointment.seller_id);
                Self::apply_event(state, AppointmentAction::AppointmentRequested { appointment });

                smallvec![Self::notify(
                    env,
                    id,
                    &[seller],
                    &NotificationKind::AppointmentRequested,
                    now,
                )]
            },

            AppointmentAction::ConfirmAppointment {
                appointment_id,
                actor,
            } => {
                let checked = Self::loaded(state, appointment_id).and_then(|a| {
                    Self::require_seller(a, actor, "confirm")?;
                    Self::require_status(a, AppointmentStatus::Requested, "confirm")?;
                    Ok((a.product_id, a.requested_quantity, a.buyer_id))
                });
                let (product_id, quantity, buyer) = match checked {
                    Ok(found) => found,
                    Err(error) => return Self::fail(state, error),
                };

                Self::apply_event(
                    state,
                    AppointmentAction::AppointmentConfirmed {
                        appointment_id,
                        product_id,
                        quantity,
                        confirmed_at: now,
                    },
                );

                smallvec![Self::notify(
                    env,
                    appointment_id,
                    &[buyer],
                    &NotificationKind::AppointmentConfirmed,
                    now,
                )]
            },

            AppointmentAction::RejectAppointment {
                appointment_id,
                actor,
                reason,
            } => {
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    return Self::fail(
                        state,
                        EngineError::Validation("A rejection reason is required".to_string()),
                    );
                }
                let checked = Self::loaded(state, appointment_id).and_then(|a| {
                    Self::require_seller(a, actor, "reject")?;
                    Self::require_status(a, AppointmentStatus::Requested, "reject")?;
                    Ok(a.buyer_id)
                });
                let buyer = match checked {
                    Ok(buyer) => buyer,
                    Err(error) => return Self::fail(state, error),
                };

                let kind = NotificationKind::AppointmentRejected {
                    reason: reason.clone(),
                };
                Self::apply_event(
                    state,
                    AppointmentAction::AppointmentRejected {
                        appointment_id,
                        reason,
                        rejected_at: now,
                    },
                );

                smallvec![Self::notify(env, appointment_id, &[buyer], &kind, now)]
            },

            AppointmentAction::ExpireAppointment { appointment_id } => {
                let checked = Self::loaded(state, appointment_id).and_then(|a| {
                    Self::require_status(a, AppointmentStatus::Requested, "expire")?;
                    if now < a.scheduled_at() {
                        return Err(EngineError::Validation(format!(
                            "Appointment {appointment_id} is not due until {}",
                            a.scheduled_at()
                        )));
                    }
                    Ok((a.buyer_id, a.seller_id))
                });
                let (buyer, seller) = match checked {
                    Ok(parties) => parties,
                    Err(error) => return Self::fail(state, error),
                };

                Self::apply_event(
                    state,
                    AppointmentAction::AppointmentExpired {
                        appointment_id,
                        expired_at: now,
                    },
                );

                smallvec![Self::notify(
                    env,
                    appointment_id,
                    &[buyer, seller],
                    &NotificationKind::AppointmentExpired,
                    now,
                )]
            },

            AppointmentAction::SubmitRating { .. } => {
                let rating = match Self::validate_rating(state, &action, env, now) {
                    Ok(rating) => rating,
                    Err(error) => return Self::fail(state, error),
                };
                let kind = NotificationKind::RatingReceived {
                    direction: rating.direction,
                    score: rating.score.value(),
                };
                let (appointment_id, rated) = (rating.appointment_id, rating.rated_id);
                Self::apply_event(state, AppointmentAction::RatingSubmitted { rating });

                let mut effects: Effects =
                    smallvec![Self::notify(env, appointment_id, &[rated], &kind, now)];
                // The second rater's write is what closes the appointment
                if let Some(completion) = Self::close_if_rated(state, env, now) {
                    effects.push(completion);
                }
                effects
            },

            AppointmentAction::CompleteAppointment { appointment_id } => {
                let checked = Self::loaded(state, appointment_id).and_then(|a| {
                    Self::require_status(a, AppointmentStatus::Confirmed, "complete")
                });
                if let Err(error) = checked {
                    return Self::fail(state, error);
                }
                match Self::close_if_rated(state, env, now) {
                    Some(completion) => smallvec![completion],
                    None => Self::fail(
                        state,
                        EngineError::RatingNotAllowed(format!(
                            "Appointment {appointment_id} needs both ratings before it can complete"
                        )),
                    ),
                }
            },

            // Events replayed into the reducer only update state
            event => {
                Self::apply_event(state, event);
                SmallVec::new()
            },
        }
    }
}
