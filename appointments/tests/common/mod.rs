//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{NaiveDate, NaiveTime, Weekday};
use meetpoint_appointments::memory::InMemoryOutbox;
use meetpoint_appointments::{
    Appointment, AppointmentEngine, AvailabilityWindow, InMemoryBackend, LifecycleEnvironment,
    Listing, MeetingPointId, Money, NewAppointment, NewRating, ProductId, RatingDirection, UserId,
};
use meetpoint_runtime::retry::RetryPolicy;
use meetpoint_testing::{ManualClock, manual_clock};
use std::sync::Arc;
use std::time::Duration;

/// Engine over in-memory adapters, with one seller and one listing.
pub struct Market {
    pub engine: Arc<AppointmentEngine>,
    pub backend: InMemoryBackend,
    pub outbox: InMemoryOutbox,
    pub clock: ManualClock,
    pub listing: Listing,
    pub buyer: UserId,
}

impl Market {
    /// Seller available all Thursday, `stock` units of the product.
    pub fn with_stock(stock: u32) -> Self {
        let backend = InMemoryBackend::new();
        let outbox = InMemoryOutbox::new();
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
                    start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                },
            )
            .unwrap();
        backend.stock.set(listing.product_id, stock).unwrap();

        let env = LifecycleEnvironment::new(Arc::new(clock.clone()), Arc::new(outbox.clone()))
            .with_notification_retry(
                RetryPolicy::builder()
                    .max_retries(1)
                    .initial_delay(Duration::from_millis(1))
                    .build(),
            );
        Self {
            engine: Arc::new(AppointmentEngine::new(backend.ports(), env)),
            backend,
            outbox,
            clock,
            listing,
            buyer: UserId::new(),
        }
    }

    pub fn seller(&self) -> UserId {
        self.listing.seller_id
    }

    /// Thursday 2025-01-02 at `hour`:00, the day after the test epoch.
    pub fn slot(&self, hour: u32, quantity: u32) -> NewAppointment {
        NewAppointment {
            product_id: self.listing.product_id,
            buyer_id: self.buyer,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            scheduled_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            requested_quantity: quantity,
            unit_price_snapshot: Money::from_cents(1_250),
        }
    }

    pub async fn requested(&self, hour: u32, quantity: u32) -> Appointment {
        self.engine.request(self.slot(hour, quantity)).await.unwrap()
    }

    pub async fn confirmed(&self, hour: u32, quantity: u32) -> Appointment {
        let appointment = self.requested(hour, quantity).await;
        self.engine.confirm(appointment.id, self.seller()).await.unwrap()
    }

    pub async fn stock(&self) -> u32 {
        use meetpoint_appointments::ports::StockLedger;
        self.backend.stock.available(self.listing.product_id).await.unwrap()
    }
}

/// A rating from the right party for `direction`.
pub fn rating(appointment: &Appointment, direction: RatingDirection, score: u8, comment: &str) -> (UserId, NewRating) {
    let (rater_id, rated_id) = direction.parties(appointment);
    (
        rater_id,
        NewRating {
            appointment_id: appointment.id,
            rater_id,
            rated_id,
            direction,
            score,
            comment: Some(comment.to_string()),
        },
    )
}
