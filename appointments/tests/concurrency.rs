//! Races between confirmations, expiry and ratings.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Market, rating};
use futures::future::join_all;
use meetpoint_appointments::ports::RatingLedger;
use meetpoint_appointments::{AppointmentStatus, EngineError, ExpirySweeper, RatingDirection, SweeperConfig};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_exactly_one_confirmation() {
    let market = Arc::new(Market::with_stock(1));
    let first = market.requested(10, 1).await;
    let second = market.requested(11, 1).await;

    let tasks = [first.id, second.id].map(|id| {
        let market = Arc::clone(&market);
        tokio::spawn(async move { market.engine.confirm(id, market.seller()).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    let starved = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::InsufficientStock { .. })))
        .count();
    assert_eq!((confirmed, starved), (1, 1));
    assert_eq!(market.stock().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_confirms_decrement_once() {
    let market = Arc::new(Market::with_stock(5));
    let id = market.requested(10, 2).await.id;

    let tasks = (0..8).map(|_| {
        let market = Arc::clone(&market);
        tokio::spawn(async move { market.engine.confirm(id, market.seller()).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(err) => matches!(
            err,
            EngineError::InvalidTransition {
                from: AppointmentStatus::Confirmed,
                ..
            }
        ),
    }));
    assert_eq!(market.stock().await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expiry_and_confirmation_have_one_winner() {
    for _ in 0..20 {
        let market = Arc::new(Market::with_stock(1));
        let appointment = market.requested(10, 1).await;
        let id = appointment.id;
        market.clock.set(appointment.scheduled_at());

        let sweeper = ExpirySweeper::new(Arc::clone(&market.engine), SweeperConfig::default());
        let sweep = tokio::spawn(async move { sweeper.run_once().await });
        let confirm = {
            let market = Arc::clone(&market);
            tokio::spawn(async move { market.engine.confirm(id, market.seller()).await })
        };

        let report = sweep.await.unwrap().unwrap();
        let confirmed = confirm.await.unwrap();
        let stored = market.engine.get(id).await.unwrap().appointment;

        match stored.status {
            AppointmentStatus::Confirmed => {
                assert!(confirmed.is_ok());
                assert_eq!(report.expired, 0);
                assert_eq!(market.stock().await, 0);
            },
            AppointmentStatus::Cancelled => {
                assert!(matches!(confirmed, Err(EngineError::InvalidTransition { .. })));
                assert_eq!(report.expired, 1);
                assert_eq!(market.stock().await, 1);
            },
            other => unreachable!("unexpected state {other}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sweeps_expire_once() {
    let market = Arc::new(Market::with_stock(10));
    for hour in 8..14 {
        market.requested(hour, 1).await;
    }
    market.clock.advance(chrono::Duration::days(2));

    let sweeps = (0..3).map(|_| {
        let sweeper = ExpirySweeper::new(Arc::clone(&market.engine), SweeperConfig::default());
        tokio::spawn(async move { sweeper.run_once().await })
    });
    let reports: Vec<_> = join_all(sweeps)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(reports.iter().map(|r| r.expired).sum::<usize>(), 6);
    assert!(reports.iter().all(|r| r.failures == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_ratings_complete_once() {
    let market = Arc::new(Market::with_stock(1));
    let appointment = market.confirmed(10, 1).await;

    let tasks = RatingDirection::ALL.map(|direction| {
        let market = Arc::clone(&market);
        let (rater, input) = rating(&appointment, direction, 5, "great");
        tokio::spawn(async move { market.engine.submit_rating(rater, input).await })
    });
    let receipts: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(receipts.iter().filter(|r| r.appointment_completed).count(), 1);
    let detail = market.engine.get(appointment.id).await.unwrap();
    assert_eq!(detail.appointment.status, AppointmentStatus::Completed);
    assert_eq!(
        market
            .backend
            .ratings
            .for_appointment(appointment.id)
            .await
            .unwrap()
            .len(),
        2
    );
}
