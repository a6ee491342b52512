//! Periodic maintenance over due appointments.
//!
//! One pass:
//!
//! 1. every `Requested` appointment whose window passed is expired
//! 2. every `Confirmed` appointment that already holds both ratings is
//!    completed, repairing completions a crash skipped
//! 3. `Confirmed` appointments older than `stale_after` are counted, and the
//!    oldest batch is logged for follow-up
//!
//! Each item goes through the engine, so a sweep racing a seller's confirm
//! resolves the same way two requests would. Passes are idempotent.

use crate::engine::{AppointmentEngine, ExpireOutcome};
use crate::error::EngineError;
use crate::types::{Appointment, AppointmentStatus};
use meetpoint_runtime::metrics::SweeperMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Sweeper configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between passes
    pub interval: Duration,
    /// Most appointments read per step per pass
    pub batch_size: usize,
    /// Confirmed appointments past their window by this much are reported stale
    pub stale_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 500,
            stale_after: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Appointments moved to `Cancelled(expired)`
    pub expired: usize,
    /// Appointments completed by the closure check
    pub completed: usize,
    /// All confirmed appointments still missing a rating past `stale_after`
    pub stale_confirmed: usize,
    /// Items that failed and will be retried next pass
    pub failures: usize,
}

/// Expires overdue requests and reconciles closures.
#[derive(Debug)]
pub struct ExpirySweeper {
    engine: Arc<AppointmentEngine>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    /// Creates a new sweeper
    #[must_use]
    pub const fn new(engine: Arc<AppointmentEngine>, config: SweeperConfig) -> Self {
        Self { engine, config }
    }

    /// Run one pass.
    ///
    /// Failures on single appointments are logged and counted; only a
    /// failure to read the due batches aborts the pass.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if a due batch cannot be read.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&self) -> Result<SweepReport, EngineError> {
        let now = self.engine.now();
        let store = self.engine.store();
        let mut report = SweepReport::default();

        let due_requests = store
            .due(AppointmentStatus::Requested, now, self.config.batch_size)
            .await?;
        for appointment in due_requests {
            match self.engine.expire(appointment.id).await {
                Ok(ExpireOutcome::Expired) => report.expired += 1,
                Ok(ExpireOutcome::Skipped(status)) => {
                    tracing::debug!(appointment_id = %appointment.id, %status, "Skipping expiry");
                },
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!(appointment_id = %appointment.id, error = %error, "Expiry failed");
                },
            }
        }

        let closable = self.engine.ratings().closable(self.config.batch_size).await?;
        for id in closable {
            match self.engine.reconcile_closure(id).await {
                Ok(true) => report.completed += 1,
                Ok(false) => tracing::debug!(appointment_id = %id, "Closed elsewhere"),
                Err(error) => {
                    report.failures += 1;
                    tracing::warn!(appointment_id = %id, error = %error, "Closure check failed");
                },
            }
        }

        let stale_cutoff = chrono::Duration::from_std(self.config.stale_after)
            .ok()
            .and_then(|after| now.checked_sub_signed(after))
            .unwrap_or(now);
        report.stale_confirmed = store.count_due(AppointmentStatus::Confirmed, stale_cutoff).await?;
        if report.stale_confirmed > 0 {
            for appointment in store
                .due(AppointmentStatus::Confirmed, stale_cutoff, self.config.batch_size)
                .await?
            {
                log_stale(&appointment);
            }
        }

        SweeperMetrics::record_run(report.expired, report.completed, report.failures);
        SweeperMetrics::record_stale_confirmed(report.stale_confirmed);
        tracing::info!(
            expired = report.expired,
            completed = report.completed,
            stale_confirmed = report.stale_confirmed,
            failures = report.failures,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Run passes on the configured interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval = ?self.config.interval, batch_size = self.config.batch_size, "Sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        tracing::error!(error = %error, "Sweep aborted");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper stopping");
                    break;
                }
            }
        }
    }
}

fn log_stale(appointment: &Appointment) {
    tracing::warn!(
        appointment_id = %appointment.id,
        buyer_id = %appointment.buyer_id,
        seller_id = %appointment.seller_id,
        scheduled_at = %appointment.scheduled_at(),
        "Confirmed appointment still awaiting ratings"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::{EnginePorts, NewAppointment};
    use crate::lifecycle::LifecycleEnvironment;
    use crate::memory::{InMemoryBackend, InMemoryOutbox};
    use crate::ports::RatingLedger;
    use crate::types::{
        AvailabilityWindow, Listing, MeetingPointId, Money, ProductId, Rating, RatingDirection, RatingId, Score, UserId,
    };
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use meetpoint_testing::{ManualClock, manual_clock};

    struct Fixture {
        engine: Arc<AppointmentEngine>,
        backend: InMemoryBackend,
        clock: ManualClock,
        listing: Listing,
    }

    fn fixture() -> Fixture {
        let backend = InMemoryBackend::new();
        let clock = manual_clock();
        let listing = Listing {
            product_id: ProductId::new(),
            seller_id: UserId::new(),
            meeting_point_id: MeetingPointId::new(),
        };
        backend.catalog.add_listing(listing.clone()).unwrap();
        backend
            .catalog
            .add_availability(
                listing.seller_id,
                AvailabilityWindow {
                    weekday: Weekday::Thu,
                    start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
                },
            )
            .unwrap();
        backend.stock.set(listing.product_id, 10).unwrap();
        let ports: EnginePorts = backend.ports();
        let env = LifecycleEnvironment::new(Arc::new(clock.clone()), Arc::new(InMemoryOutbox::new()));
        Fixture {
            engine: Arc::new(AppointmentEngine::new(ports, env)),
            backend,
            clock,
            listing,
        }
    }

    async fn request(f: &Fixture, hour: u32) -> Appointment {
        f.engine
            .request(NewAppointment {
                product_id: f.listing.product_id,
                buyer_id: UserId::new(),
                scheduled_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                scheduled_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                requested_quantity: 1,
                unit_price_snapshot: Money::from_cents(100),
            })
            .await
            .unwrap()
    }

    fn config() -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_millis(10),
            batch_size: 100,
            stale_after: Duration::from_secs(24 * 3600),
        }
    }

    #[tokio::test]
    async fn expires_only_due_requests() {
        let f = fixture();
        let early = request(&f, 9).await;
        let late = request(&f, 18).await;

        f.clock.set(early.scheduled_at());
        let sweeper = ExpirySweeper::new(Arc::clone(&f.engine), config());
        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.expired, 1);

        assert_eq!(
            f.engine.get(early.id).await.unwrap().appointment.status,
            AppointmentStatus::Cancelled
        );
        assert_eq!(
            f.engine.get(late.id).await.unwrap().appointment.status,
            AppointmentStatus::Requested
        );
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let f = fixture();
        let appointment = request(&f, 9).await;
        f.clock.set(appointment.scheduled_at());

        let sweeper = ExpirySweeper::new(Arc::clone(&f.engine), config());
        assert_eq!(sweeper.run_once().await.unwrap().expired, 1);
        assert_eq!(sweeper.run_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn reports_stale_confirmed_appointments() {
        let f = fixture();
        let appointment = request(&f, 9).await;
        f.engine.confirm(appointment.id, f.listing.seller_id).await.unwrap();

        let sweeper = ExpirySweeper::new(Arc::clone(&f.engine), config());
        f.clock.set(appointment.scheduled_at());
        assert_eq!(sweeper.run_once().await.unwrap().stale_confirmed, 0);

        f.clock.advance(chrono::Duration::hours(25));
        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.stale_confirmed, 1);
        assert_eq!(report.completed, 0);
    }

    async fn confirmed(f: &Fixture, hour: u32) -> Appointment {
        let appointment = request(f, hour).await;
        f.engine.confirm(appointment.id, f.listing.seller_id).await.unwrap()
    }

    #[tokio::test]
    async fn closure_pass_is_not_starved_by_stale_appointments() {
        let f = fixture();
        confirmed(&f, 9).await;
        let rated = confirmed(&f, 10).await;
        // Both ratings stored, completion never written
        for direction in RatingDirection::ALL {
            let (rater_id, rated_id) = direction.parties(&rated);
            f.backend
                .ratings
                .insert(&Rating {
                    id: RatingId::new(),
                    appointment_id: rated.id,
                    rater_id,
                    rated_id,
                    direction,
                    score: Score::try_from(5).unwrap(),
                    comment: None,
                    created_at: f.engine.now(),
                })
                .await
                .unwrap();
        }

        f.clock.advance(chrono::Duration::days(30));
        let sweeper = ExpirySweeper::new(
            Arc::clone(&f.engine),
            SweeperConfig {
                batch_size: 1,
                ..config()
            },
        );
        assert_eq!(
            sweeper.run_once().await.unwrap(),
            SweepReport {
                expired: 0,
                completed: 1,
                stale_confirmed: 1,
                failures: 0,
            }
        );
        assert_eq!(
            f.engine.get(rated.id).await.unwrap().appointment.status,
            AppointmentStatus::Completed
        );
        assert_eq!(sweeper.run_once().await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn stale_count_is_not_capped_by_batch_size() {
        let f = fixture();
        for hour in [9, 10, 11] {
            confirmed(&f, hour).await;
        }

        f.clock.advance(chrono::Duration::days(30));
        let sweeper = ExpirySweeper::new(
            Arc::clone(&f.engine),
            SweeperConfig {
                batch_size: 1,
                ..config()
            },
        );
        assert_eq!(sweeper.run_once().await.unwrap().stale_confirmed, 3);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let f = fixture();
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(ExpirySweeper::new(Arc::clone(&f.engine), config()).run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
