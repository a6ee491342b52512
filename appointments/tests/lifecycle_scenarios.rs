//! End-to-end lifecycle scenarios against the in-memory adapters.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Market, rating};
use meetpoint_appointments::ports::{NotificationKind, RatingLedger};
use meetpoint_appointments::{
    AppointmentQuery, AppointmentStatus, CancellationReason, EngineError, ErrorKind, ExpirySweeper,
    Money, RatingDirection, Role, SweeperConfig, UserId,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn full_exchange_completes_after_both_ratings() {
    let market = Market::with_stock(1);
    let appointment = market.requested(10, 1).await;
    assert_eq!(appointment.status, AppointmentStatus::Requested);

    let confirmed = market.engine.confirm(appointment.id, market.seller()).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
    assert_eq!(market.stock().await, 0);

    let (buyer, first) = rating(&confirmed, RatingDirection::BuyerToSeller, 4, "good");
    let receipt = market.engine.submit_rating(buyer, first).await.unwrap();
    assert!(!receipt.appointment_completed);
    assert_eq!(receipt.appointment.status, AppointmentStatus::Confirmed);

    let (seller, second) = rating(&confirmed, RatingDirection::SellerToBuyer, 5, "great");
    let receipt = market.engine.submit_rating(seller, second).await.unwrap();
    assert!(receipt.appointment_completed);
    assert_eq!(receipt.appointment.status, AppointmentStatus::Completed);
    assert!(receipt.appointment.completed_at.is_some());

    let detail = market.engine.get(appointment.id).await.unwrap();
    assert_eq!(detail.appointment.status, AppointmentStatus::Completed);
    assert_eq!(detail.total, Money::from_cents(1_250));
    let mut scores: Vec<u8> = detail.ratings.iter().map(|r| r.score.value()).collect();
    scores.sort_unstable();
    assert_eq!(scores, vec![4, 5]);
}

#[tokio::test]
async fn confirm_without_enough_stock_leaves_request_untouched() {
    let market = Market::with_stock(1);
    let appointment = market.requested(10, 2).await;

    let err = market.engine.confirm(appointment.id, market.seller()).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientStock {
            product_id: market.listing.product_id,
            requested: 2,
            available: 1,
        }
    );
    assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    assert_eq!(market.stock().await, 1);
    assert_eq!(
        market.engine.get(appointment.id).await.unwrap().appointment.status,
        AppointmentStatus::Requested
    );
}

#[tokio::test]
async fn duplicate_rating_keeps_one_row() {
    let market = Market::with_stock(1);
    let appointment = market.confirmed(10, 1).await;

    let (buyer, input) = rating(&appointment, RatingDirection::BuyerToSeller, 4, "good");
    market.engine.submit_rating(buyer, input.clone()).await.unwrap();
    let err = market.engine.submit_rating(buyer, input).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRating { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = market.backend.ratings.for_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].direction, RatingDirection::BuyerToSeller);
}

#[tokio::test]
async fn reject_needs_a_reason_and_never_touches_stock() {
    let market = Market::with_stock(3);
    let appointment = market.requested(10, 2).await;

    let err = market
        .engine
        .reject(appointment.id, market.seller(), "   ".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let rejected = market
        .engine
        .reject(appointment.id, market.seller(), "Sold elsewhere".to_string())
        .await
        .unwrap();
    assert_eq!(rejected.status, AppointmentStatus::Cancelled);
    assert_eq!(
        rejected.cancellation_reason,
        Some(CancellationReason::Rejected {
            note: "Sold elsewhere".to_string()
        })
    );
    assert_eq!(market.stock().await, 3);
}

#[tokio::test]
async fn terminal_states_refuse_further_transitions() {
    let market = Market::with_stock(1);
    let appointment = market.requested(10, 1).await;
    market
        .engine
        .reject(appointment.id, market.seller(), "No".to_string())
        .await
        .unwrap();

    let err = market.engine.confirm(appointment.id, market.seller()).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            attempted: "confirm",
        }
    );

    let (buyer, input) = rating(&appointment, RatingDirection::BuyerToSeller, 3, "ok");
    let err = market.engine.submit_rating(buyer, input).await.unwrap_err();
    assert!(matches!(err, EngineError::RatingNotAllowed(_)));
}

#[tokio::test]
async fn only_the_seller_decides() {
    let market = Market::with_stock(1);
    let appointment = market.requested(10, 1).await;

    let err = market.engine.confirm(appointment.id, market.buyer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = market
        .engine
        .reject(appointment.id, UserId::new(), "No".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn rating_from_the_wrong_party_is_forbidden() {
    let market = Market::with_stock(1);
    let appointment = market.confirmed(10, 1).await;

    let (_, input) = rating(&appointment, RatingDirection::BuyerToSeller, 5, "great");
    let err = market.engine.submit_rating(market.seller(), input).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn requests_outside_availability_or_in_the_past_fail() {
    let market = Market::with_stock(1);

    let err = market.engine.request(market.slot(21, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    market.clock.set(market.slot(12, 1).scheduled_date.and_hms_opt(12, 0, 0).unwrap().and_utc());
    let err = market.engine.request(market.slot(10, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn seller_slot_can_be_held_once() {
    let market = Market::with_stock(5);
    market.requested(10, 1).await;

    let err = market.engine.request(market.slot(10, 1)).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotTaken { .. }));

    // A cancelled appointment frees the slot
    let other = market.requested(11, 1).await;
    market
        .engine
        .reject(other.id, market.seller(), "Busy".to_string())
        .await
        .unwrap();
    assert!(market.engine.request(market.slot(11, 1)).await.is_ok());
}

#[tokio::test]
async fn sweeper_expires_overdue_requests_once() {
    let market = Market::with_stock(1);
    let appointment = market.requested(10, 1).await;
    market
        .clock
        .set(appointment.scheduled_at() + chrono::Duration::seconds(1));

    let sweeper = ExpirySweeper::new(Arc::clone(&market.engine), SweeperConfig::default());
    let first = sweeper.run_once().await.unwrap();
    assert_eq!(first.expired, 1);

    let expired = market.engine.get(appointment.id).await.unwrap().appointment;
    assert_eq!(expired.status, AppointmentStatus::Cancelled);
    assert_eq!(expired.cancellation_reason, Some(CancellationReason::Expired));

    let second = sweeper.run_once().await.unwrap();
    assert_eq!(second.expired, 0);
    assert_eq!(second.failures, 0);
}

#[tokio::test]
async fn listing_filters_by_role_and_state() {
    let market = Market::with_stock(5);
    let first = market.requested(9, 1).await;
    market.confirmed(10, 1).await;

    let as_buyer = market
        .engine
        .list(&AppointmentQuery {
            role: Role::Buyer,
            user_id: market.buyer,
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(as_buyer.len(), 2);

    let requested = market
        .engine
        .list(&AppointmentQuery {
            role: Role::Seller,
            user_id: market.seller(),
            status: Some(AppointmentStatus::Requested),
        })
        .await
        .unwrap();
    assert_eq!(requested.iter().map(|a| a.id).collect::<Vec<_>>(), vec![first.id]);

    let as_seller_of_nothing = market
        .engine
        .list(&AppointmentQuery {
            role: Role::Seller,
            user_id: market.buyer,
            status: None,
        })
        .await
        .unwrap();
    assert!(as_seller_of_nothing.is_empty());
}

#[tokio::test]
async fn reputation_averages_received_ratings() {
    let market = Market::with_stock(5);
    for (hour, score) in [(10, 4), (11, 5)] {
        let appointment = market.confirmed(hour, 1).await;
        let (buyer, input) = rating(&appointment, RatingDirection::BuyerToSeller, score, "fine");
        market.engine.submit_rating(buyer, input).await.unwrap();
    }

    let reputation = market
        .engine
        .reputation(market.seller(), Some(RatingDirection::BuyerToSeller))
        .await
        .unwrap();
    assert_eq!(reputation.count, 2);
    assert!((reputation.average.unwrap() - 4.5).abs() < f64::EPSILON);

    let as_buyer = market.engine.reputation(market.buyer, None).await.unwrap();
    assert_eq!(as_buyer.count, 0);
    assert!(as_buyer.average.is_none());
}

#[tokio::test]
async fn each_transition_notifies_its_parties() {
    let market = Market::with_stock(1);
    let appointment = market.confirmed(10, 1).await;
    for direction in RatingDirection::ALL {
        let (rater, input) = rating(&appointment, direction, 5, "great");
        market.engine.submit_rating(rater, input).await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(1), market.engine.flush_notifications())
        .await
        .unwrap();

    let to_seller: Vec<_> = market
        .outbox
        .for_recipient(market.seller())
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(to_seller.contains(&NotificationKind::AppointmentRequested));
    assert!(to_seller.contains(&NotificationKind::AppointmentCompleted));

    let to_buyer: Vec<_> = market
        .outbox
        .for_recipient(market.buyer)
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(to_buyer.contains(&NotificationKind::AppointmentConfirmed));
    assert!(to_buyer.contains(&NotificationKind::AppointmentCompleted));
    assert_eq!(
        to_buyer
            .iter()
            .filter(|k| matches!(k, NotificationKind::RatingReceived { .. }))
            .count(),
        1
    );
}
