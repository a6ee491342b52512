//! The state transition engine.
//!
//! Imperative shell around [`LifecycleReducer`]: load the appointment into a
//! [`LifecycleState`], let the reducer decide, persist the pending events
//! through the ports, then hand the notification effects to the
//! [`EffectRunner`]. Notifications are spawned only after persistence
//! succeeded and never fail the caller.
//!
//! Persistence rules:
//!
//! - confirm: atomic stock decrement, then compare-and-set from `Requested`;
//!   a lost compare-and-set gives the stock back
//! - reject / expire: compare-and-set from `Requested`
//! - rating: ledger insert, then the closure check
//! - completion: compare-and-set from `Confirmed`; losing to a concurrent
//!   completion is success

use crate::error::{EngineError, ErrorKind, StorageError};
use crate::lifecycle::{AppointmentAction, LifecycleEnvironment, LifecycleReducer, LifecycleState, RequestContext};
use crate::locks::AppointmentLocks;
use crate::ports::{AppointmentStore, Catalog, RatingLedger, StockDecrement, StockLedger};
use crate::types::{
    Appointment, AppointmentId, AppointmentQuery, AppointmentStatus, Money, ProductId, Rating,
    RatingDirection, RatingId, Reputation, UserId, scheduled_at,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use meetpoint_core::{SmallVec, effect::Effect, reducer::Reducer};
use meetpoint_runtime::metrics::EngineMetrics;
use meetpoint_runtime::{EffectHandle, EffectRunner};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

type Effects = SmallVec<[Effect<AppointmentAction>; 4]>;

/// The storage side of the engine.
#[derive(Clone)]
pub struct EnginePorts {
    /// Per-product stock
    pub stock: Arc<dyn StockLedger>,
    /// Appointment records
    pub appointments: Arc<dyn AppointmentStore>,
    /// Rating records
    pub ratings: Arc<dyn RatingLedger>,
    /// Listings and availability
    pub catalog: Arc<dyn Catalog>,
}

/// Input for [`AppointmentEngine::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    /// Product to exchange
    pub product_id: ProductId,
    /// Buyer making the request
    pub buyer_id: UserId,
    /// Day of the exchange (UTC)
    pub scheduled_date: NaiveDate,
    /// Time of the exchange (UTC)
    pub scheduled_time: NaiveTime,
    /// Units wanted
    pub requested_quantity: u32,
    /// Unit price the buyer saw
    pub unit_price_snapshot: Money,
}

/// Input for [`AppointmentEngine::submit_rating`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRating {
    /// Appointment being rated
    pub appointment_id: AppointmentId,
    /// Who writes the rating
    pub rater_id: UserId,
    /// Who is rated
    pub rated_id: UserId,
    /// Direction
    pub direction: RatingDirection,
    /// 1 to 5
    pub score: u8,
    /// Optional comment
    pub comment: Option<String>,
}

/// Appointment plus everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetail {
    /// The appointment
    pub appointment: Appointment,
    /// `requested_quantity × unit_price_snapshot`
    pub total: Money,
    /// Zero, one or two ratings
    pub ratings: Vec<Rating>,
}

/// Result of a rating write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingReceipt {
    /// The stored rating
    pub rating: Rating,
    /// The appointment after the write
    pub appointment: Appointment,
    /// Whether this write closed the appointment
    pub appointment_completed: bool,
}

/// What an expiry attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExpireOutcome {
    /// Moved to `Cancelled(expired)`
    Expired,
    /// Already out of `Requested`; nothing to do
    Skipped(AppointmentStatus),
}

/// Validates and applies appointment transitions.
pub struct AppointmentEngine {
    ports: EnginePorts,
    env: LifecycleEnvironment,
    reducer: LifecycleReducer,
    locks: AppointmentLocks,
    in_flight: Mutex<Vec<EffectHandle<AppointmentAction>>>,
}

impl std::fmt::Debug for AppointmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentEngine")
            .field("env", &self.env)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl AppointmentEngine {
    /// Creates a new engine
    #[must_use]
    pub fn new(ports: EnginePorts, env: LifecycleEnvironment) -> Self {
        Self {
            ports,
            env,
            reducer: LifecycleReducer::new(),
            locks: AppointmentLocks::new(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.env.clock.now()
    }

    pub(crate) fn store(&self) -> &Arc<dyn AppointmentStore> {
        &self.ports.appointments
    }

    pub(crate) fn ratings(&self) -> &Arc<dyn RatingLedger> {
        &self.ports.ratings
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Create an appointment in `Requested`. Touches no stock.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a past window, a slot outside the
    ///   seller's availability, a zero quantity or the seller as buyer
    /// - [`EngineError::NotFound`] for an unknown product
    /// - [`EngineError::SlotTaken`] if the seller already holds the slot
    #[tracing::instrument(skip_all, fields(product_id = %input.product_id, buyer_id = %input.buyer_id))]
    pub async fn request(&self, input: NewAppointment) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.request_inner(input).await;
        Self::finish("request", started, &result);
        result
    }

    /// Seller accepts; stock is decremented with the transition.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InsufficientStock`] if the ledger cannot cover the
    ///   quantity; the appointment stays `Requested`
    /// - [`EngineError::InvalidTransition`] if not `Requested`
    /// - [`EngineError::Forbidden`] if `actor` is not the seller
    #[tracing::instrument(skip_all, fields(appointment_id = %id, actor = %actor))]
    pub async fn confirm(&self, id: AppointmentId, actor: UserId) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = async {
            let _guard = self.locks.acquire(id).await;
            let mut state = self.load(id, false).await?;
            let effects = self.decide(
                &mut state,
                AppointmentAction::ConfirmAppointment {
                    appointment_id: id,
                    actor,
                },
            )?;
            self.persist(&mut state).await?;
            self.dispatch(effects);
            Self::current(state, id)
        }
        .await;
        Self::finish("confirm", started, &result);
        result
    }

    /// Seller declines with a reason. Touches no stock.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a blank reason
    /// - [`EngineError::InvalidTransition`] if not `Requested`
    /// - [`EngineError::Forbidden`] if `actor` is not the seller
    #[tracing::instrument(skip_all, fields(appointment_id = %id, actor = %actor))]
    pub async fn reject(
        &self,
        id: AppointmentId,
        actor: UserId,
        reason: String,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = async {
            let _guard = self.locks.acquire(id).await;
            let mut state = self.load(id, false).await?;
            let effects = self.decide(
                &mut state,
                AppointmentAction::RejectAppointment {
                    appointment_id: id,
                    actor,
                    reason,
                },
            )?;
            self.persist(&mut state).await?;
            self.dispatch(effects);
            Self::current(state, id)
        }
        .await;
        Self::finish("reject", started, &result);
        result
    }

    /// Record one directional rating; the second direction completes the
    /// appointment.
    ///
    /// # Errors
    ///
    /// - [`EngineError::DuplicateRating`] if that direction exists
    /// - [`EngineError::RatingNotAllowed`] if the appointment is not `Confirmed`
    /// - [`EngineError::Forbidden`] if the parties don't match the direction
    /// - [`EngineError::Validation`] for a bad score or comment
    #[tracing::instrument(skip_all, fields(appointment_id = %input.appointment_id, direction = %input.direction))]
    pub async fn submit_rating(&self, actor: UserId, input: NewRating) -> Result<RatingReceipt, EngineError> {
        let started = Instant::now();
        let result = self.submit_rating_inner(actor, input).await;
        Self::finish("rate", started, &result);
        result
    }

    /// Appointment, its total and its ratings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    #[tracing::instrument(skip_all, fields(appointment_id = %id))]
    pub async fn get(&self, id: AppointmentId) -> Result<AppointmentDetail, EngineError> {
        let LifecycleState {
            appointment, ratings, ..
        } = self.load(id, true).await?;
        let appointment = appointment.ok_or_else(|| EngineError::appointment_not_found(id))?;
        let total = appointment
            .total()
            .ok_or_else(|| StorageError::Corrupt(format!("appointment {id} total overflows")))?;
        Ok(AppointmentDetail {
            appointment,
            total,
            ratings,
        })
    }

    /// One user's appointments as buyer or seller.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage failure.
    pub async fn list(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.ports.appointments.list(query).await?)
    }

    /// Count and average of ratings a user received.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage failure.
    pub async fn reputation(
        &self,
        user_id: UserId,
        direction: Option<RatingDirection>,
    ) -> Result<Reputation, EngineError> {
        let received = self.ports.ratings.received_by(user_id, direction).await?;
        Ok(Reputation::from_ratings(user_id, direction, &received))
    }

    /// Probe the appointment store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the store is unreachable.
    pub async fn ping(&self) -> Result<(), EngineError> {
        Ok(self.ports.appointments.ping().await?)
    }

    /// Wait for every notification spawned so far.
    pub async fn flush_notifications(&self) {
        let handles = std::mem::take(&mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(error) = handle.wait().await {
                tracing::warn!(error = %error, "Notification task failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Sweeper paths
    // ------------------------------------------------------------------

    /// Cancel a `Requested` appointment whose window passed. Anything else
    /// is a no-op, so re-running a sweep is safe.
    #[tracing::instrument(skip_all, fields(appointment_id = %id))]
    pub(crate) async fn expire(&self, id: AppointmentId) -> Result<ExpireOutcome, EngineError> {
        let started = Instant::now();
        let result = async {
            let _guard = self.locks.acquire(id).await;
            let mut state = self.load(id, false).await?;
            match state.status() {
                Some(AppointmentStatus::Requested) => {},
                Some(status) => return Ok(ExpireOutcome::Skipped(status)),
                None => return Err(EngineError::appointment_not_found(id)),
            }
            let effects = self.decide(&mut state, AppointmentAction::ExpireAppointment { appointment_id: id })?;
            match self.persist(&mut state).await {
                Ok(()) => {
                    self.dispatch(effects);
                    Ok(ExpireOutcome::Expired)
                },
                // Confirmed or rejected between our read and our write
                Err(EngineError::InvalidTransition { from, .. }) => Ok(ExpireOutcome::Skipped(from)),
                Err(error) => Err(error),
            }
        }
        .await;
        Self::finish("expire", started, &result);
        result
    }

    /// Run the closure check for a `Confirmed` appointment. Returns whether
    /// it completed.
    #[tracing::instrument(skip_all, fields(appointment_id = %id))]
    pub(crate) async fn reconcile_closure(&self, id: AppointmentId) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(id).await;
        let Some(appointment) = self.ports.appointments.get(id).await? else {
            return Err(EngineError::appointment_not_found(id));
        };
        if appointment.status != AppointmentStatus::Confirmed {
            return Ok(false);
        }
        Ok(self.close_if_rated(appointment).await?.is_some())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn request_inner(&self, input: NewAppointment) -> Result<Appointment, EngineError> {
        let at = scheduled_at(input.scheduled_date, input.scheduled_time);
        let listing = self.ports.catalog.listing(input.product_id).await?;
        let mut context = RequestContext {
            listing: listing.clone(),
            ..RequestContext::default()
        };
        if let Some(listing) = listing {
            context.availability = self
                .ports
                .catalog
                .availability(listing.seller_id, input.scheduled_date.weekday())
                .await?;
            context.slot_holder = self
                .ports
                .appointments
                .active_at_slot(listing.seller_id, at)
                .await?;
        }

        let appointment_id = AppointmentId::new();
        let mut state = LifecycleState::for_request(context);
        let effects = self.decide(
            &mut state,
            AppointmentAction::RequestAppointment {
                appointment_id,
                product_id: input.product_id,
                buyer_id: input.buyer_id,
                scheduled_date: input.scheduled_date,
                scheduled_time: input.scheduled_time,
                requested_quantity: input.requested_quantity,
                unit_price_snapshot: input.unit_price_snapshot,
            },
        )?;
        self.persist(&mut state).await?;
        self.dispatch(effects);
        Self::current(state, appointment_id)
    }

    async fn submit_rating_inner(&self, actor: UserId, input: NewRating) -> Result<RatingReceipt, EngineError> {
        let id = input.appointment_id;
        let rating_id = RatingId::new();
        let _guard = self.locks.acquire(id).await;

        let mut state = self.load(id, true).await?;
        let decided = self.decide(
            &mut state,
            AppointmentAction::SubmitRating {
                rating_id,
                appointment_id: id,
                actor,
                rater_id: input.rater_id,
                rated_id: input.rated_id,
                direction: input.direction,
                score: input.score,
                comment: input.comment,
            },
        );
        let effects = match decided {
            Ok(effects) => effects,
            Err(error) => return Err(self.after_refused_rating(id, error).await),
        };
        let rating = state
            .ratings
            .iter()
            .find(|r| r.id == rating_id)
            .cloned()
            .ok_or_else(|| StorageError::Corrupt(format!("rating {rating_id} was not recorded")))?;

        if let Err(error) = self.persist(&mut state).await {
            return Err(self.after_refused_rating(id, error).await);
        }
        self.dispatch(effects);

        let mut appointment = Self::current(state, id)?;
        let mut appointment_completed = appointment.status == AppointmentStatus::Completed;
        if !appointment_completed {
            // Another process may have written the other direction meanwhile
            if let Some(closed) = self.close_if_rated(appointment.clone()).await? {
                appointment = closed;
                appointment_completed = true;
            }
        }

        Ok(RatingReceipt {
            rating,
            appointment,
            appointment_completed,
        })
    }

    /// Complete `appointment` if the ledger holds both ratings. The caller
    /// holds the appointment's lock.
    async fn close_if_rated(&self, appointment: Appointment) -> Result<Option<Appointment>, EngineError> {
        let id = appointment.id;
        let ratings = self.ports.ratings.for_appointment(id).await?;
        let mut state = LifecycleState::loaded(Some(appointment), ratings);
        if !state.both_rated() {
            return Ok(None);
        }
        let effects = self.decide(&mut state, AppointmentAction::CompleteAppointment { appointment_id: id })?;
        self.persist(&mut state).await?;
        self.dispatch(effects);
        Ok(Some(Self::current(state, id)?))
    }

    /// On a duplicate, complete the appointment if both ratings are already
    /// stored, so a retried second rating still closes it. Returns `error`.
    async fn after_refused_rating(&self, id: AppointmentId, error: EngineError) -> EngineError {
        if !matches!(error, EngineError::DuplicateRating { .. }) {
            return error;
        }
        let repaired = match self.ports.appointments.get(id).await {
            Ok(Some(appointment)) if appointment.status == AppointmentStatus::Confirmed => {
                self.close_if_rated(appointment).await.map(|closed| closed.is_some())
            },
            Ok(_) => Ok(false),
            Err(storage) => Err(storage.into()),
        };
        match repaired {
            Ok(true) => tracing::info!(appointment_id = %id, "Completed appointment on duplicate rating"),
            Ok(false) => {},
            Err(repair) => {
                tracing::warn!(appointment_id = %id, error = %repair, "Closure check after duplicate rating failed");
            },
        }
        error
    }

    async fn load(&self, id: AppointmentId, with_ratings: bool) -> Result<LifecycleState, EngineError> {
        let appointment = self
            .ports
            .appointments
            .get(id)
            .await?
            .ok_or_else(|| EngineError::appointment_not_found(id))?;
        let ratings = if with_ratings {
            self.ports.ratings.for_appointment(id).await?
        } else {
            Vec::new()
        };
        Ok(LifecycleState::loaded(Some(appointment), ratings))
    }

    fn current(state: LifecycleState, id: AppointmentId) -> Result<Appointment, EngineError> {
        state
            .appointment
            .ok_or_else(|| EngineError::appointment_not_found(id))
    }

    fn decide(&self, state: &mut LifecycleState, action: AppointmentAction) -> Result<Effects, EngineError> {
        let effects = self.reducer.reduce(state, action, &self.env);
        match state.last_error.take() {
            Some(error) => Err(error),
            None => Ok(effects),
        }
    }

    /// Write pending events in order. Stops at the first failure.
    async fn persist(&self, state: &mut LifecycleState) -> Result<(), EngineError> {
        let pending = state.take_pending();
        let Some(target) = state.appointment.clone() else {
            return Ok(());
        };

        let mut pending = pending.into_iter().peekable();
        while let Some(event) = pending.next() {
            match event {
                AppointmentAction::AppointmentRequested { appointment } => {
                    self.ports
                        .appointments
                        .insert(&appointment)
                        .await
                        .map_err(|error| match error {
                            StorageError::Duplicate(_) => EngineError::SlotTaken {
                                seller_id: appointment.seller_id,
                                scheduled_at: appointment.scheduled_at(),
                            },
                            other => other.into(),
                        })?;
                    EngineMetrics::record_transition("requested");
                    tracing::info!(
                        appointment_id = %appointment.id,
                        seller_id = %appointment.seller_id,
                        scheduled_at = %appointment.scheduled_at(),
                        "Appointment requested"
                    );
                },
                AppointmentAction::AppointmentConfirmed {
                    product_id, quantity, ..
                } => {
                    self.commit_confirmation(&target, product_id, quantity).await?;
                    EngineMetrics::record_transition("requested_to_confirmed");
                    tracing::info!(appointment_id = %target.id, %product_id, quantity, "Appointment confirmed");
                },
                AppointmentAction::AppointmentRejected { .. } => {
                    self.commit_transition(AppointmentStatus::Requested, &target, "reject")
                        .await?;
                    EngineMetrics::record_transition("requested_to_rejected");
                    tracing::info!(appointment_id = %target.id, "Appointment rejected");
                },
                AppointmentAction::AppointmentExpired { .. } => {
                    self.commit_transition(AppointmentStatus::Requested, &target, "expire")
                        .await?;
                    EngineMetrics::record_transition("requested_to_expired");
                    tracing::info!(appointment_id = %target.id, "Appointment expired");
                },
                AppointmentAction::RatingSubmitted { rating } => {
                    if matches!(pending.peek(), Some(AppointmentAction::AppointmentCompleted { .. })) {
                        pending.next();
                        self.commit_closing_rating(&rating, &target).await?;
                        log_rating(&rating);
                        EngineMetrics::record_transition("confirmed_to_completed");
                        tracing::info!(appointment_id = %target.id, "Appointment completed");
                    } else {
                        self.ports
                            .ratings
                            .insert(&rating)
                            .await
                            .map_err(|error| rating_conflict(&rating, error))?;
                        log_rating(&rating);
                    }
                },
                AppointmentAction::AppointmentCompleted { .. } => {
                    match self.commit_transition(AppointmentStatus::Confirmed, &target, "complete").await {
                        Ok(()) => {
                            EngineMetrics::record_transition("confirmed_to_completed");
                            tracing::info!(appointment_id = %target.id, "Appointment completed");
                        },
                        Err(EngineError::InvalidTransition {
                            from: AppointmentStatus::Completed,
                            ..
                        }) => {
                            // A concurrent closure check got there first
                            if let Some(stored) = self.ports.appointments.get(target.id).await? {
                                state.appointment = Some(stored);
                            }
                        },
                        Err(error) => return Err(error),
                    }
                },
                AppointmentAction::CommandFailed { .. }
                | AppointmentAction::RequestAppointment { .. }
                | AppointmentAction::ConfirmAppointment { .. }
                | AppointmentAction::RejectAppointment { .. }
                | AppointmentAction::ExpireAppointment { .. }
                | AppointmentAction::SubmitRating { .. }
                | AppointmentAction::CompleteAppointment { .. } => {},
            }
        }
        Ok(())
    }

    /// Decrement stock, then move the appointment out of `Requested`.
    async fn commit_confirmation(
        &self,
        target: &Appointment,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), EngineError> {
        match self.ports.stock.try_decrement(product_id, quantity).await? {
            StockDecrement::Insufficient { available } => {
                return Err(EngineError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            },
            StockDecrement::Applied { remaining } => {
                tracing::debug!(%product_id, remaining, "Stock decremented");
            },
        }

        let swapped = match self
            .ports
            .appointments
            .compare_and_set(AppointmentStatus::Requested, target)
            .await
        {
            Ok(swapped) => swapped,
            Err(error) => {
                // The write may or may not have landed; restoring could
                // oversell, so the units stay taken.
                tracing::error!(
                    appointment_id = %target.id,
                    %product_id,
                    quantity,
                    error = %error,
                    "Stock decremented but confirmation outcome unknown"
                );
                return Err(error.into());
            },
        };

        if swapped {
            return Ok(());
        }

        if let Err(error) = self.ports.stock.restore(product_id, quantity).await {
            tracing::error!(
                appointment_id = %target.id,
                %product_id,
                quantity,
                error = %error,
                "Failed to restore stock after lost confirmation"
            );
        }
        Err(self.lost_race(target.id, "confirm").await)
    }

    /// Write the second rating and the completion as one storage step.
    async fn commit_closing_rating(&self, rating: &Rating, target: &Appointment) -> Result<(), EngineError> {
        let closed = self
            .ports
            .ratings
            .insert_closing(rating, target)
            .await
            .map_err(|error| rating_conflict(rating, error))?;
        if closed {
            Ok(())
        } else {
            Err(self.lost_race(target.id, "complete").await)
        }
    }

    async fn commit_transition(
        &self,
        expected: AppointmentStatus,
        target: &Appointment,
        attempted: &'static str,
    ) -> Result<(), EngineError> {
        if self.ports.appointments.compare_and_set(expected, target).await? {
            Ok(())
        } else {
            Err(self.lost_race(target.id, attempted).await)
        }
    }

    /// Error for a compare-and-set that found another state.
    async fn lost_race(&self, id: AppointmentId, attempted: &'static str) -> EngineError {
        match self.ports.appointments.get(id).await {
            Ok(Some(current)) => EngineError::InvalidTransition {
                from: current.status,
                attempted,
            },
            Ok(None) => EngineError::appointment_not_found(id),
            Err(error) => error.into(),
        }
    }

    fn dispatch(&self, effects: Effects) {
        if effects.iter().all(Effect::is_none) {
            return;
        }
        let handle = EffectRunner::spawn(effects);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
    }

    fn finish<T>(command: &'static str, started: Instant, result: &Result<T, EngineError>) {
        EngineMetrics::record_command(command, started.elapsed());
        let Err(error) = result else {
            return;
        };
        match error.kind() {
            ErrorKind::Conflict => {
                EngineMetrics::record_conflict(error.code());
                tracing::warn!(command, code = error.code(), error = %error, "Command conflicted");
            },
            ErrorKind::System => {
                tracing::error!(command, error = %error, "Command failed");
            },
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Forbidden => {
                tracing::debug!(command, code = error.code(), error = %error, "Command rejected");
            },
        }
    }
}

fn rating_conflict(rating: &Rating, error: StorageError) -> EngineError {
    match error {
        StorageError::Duplicate(_) => EngineError::DuplicateRating {
            appointment_id: rating.appointment_id,
            direction: rating.direction,
        },
        other => other.into(),
    }
}

fn log_rating(rating: &Rating) {
    tracing::info!(
        appointment_id = %rating.appointment_id,
        direction = %rating.direction,
        score = rating.score.value(),
        "Rating recorded"
    );
}
