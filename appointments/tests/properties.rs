//! Property tests over scores and arbitrary command sequences.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Market, rating};
use meetpoint_appointments::ports::RatingLedger;
use meetpoint_appointments::{AppointmentStatus, ErrorKind, RatingDirection, Score};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Step {
    Confirm,
    Reject,
    Rate(RatingDirection, u8),
    Expire,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Confirm),
        Just(Step::Reject),
        Just(Step::Expire),
        (prop::sample::select(RatingDirection::ALL.to_vec()), 0u8..=7).prop_map(|(d, s)| Step::Rate(d, s)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn scores_outside_one_to_five_are_rejected(value in any::<u8>()) {
        let parsed = Score::try_from(value);
        prop_assert_eq!(parsed.is_ok(), (1..=5).contains(&value));
    }

    #[test]
    fn completion_needs_confirmation_and_both_ratings(steps in prop::collection::vec(step(), 1..12)) {
        runtime().block_on(async {
            let market = Market::with_stock(1);
            let appointment = market.requested(10, 1).await;
            let mut was_confirmed = false;

            for step in steps {
                let result = match step {
                    Step::Confirm => market.engine.confirm(appointment.id, market.seller()).await.map(|a| a.status),
                    Step::Reject => market
                        .engine
                        .reject(appointment.id, market.seller(), "Changed plans".to_string())
                        .await
                        .map(|a| a.status),
                    Step::Rate(direction, score) => {
                        let (rater, input) = rating(&appointment, direction, score, "ok");
                        market.engine.submit_rating(rater, input).await.map(|r| r.appointment.status)
                    },
                    Step::Expire => {
                        // Jump past the window; only the sweeper may expire
                        market.clock.set(appointment.scheduled_at());
                        let sweeper = meetpoint_appointments::ExpirySweeper::new(
                            std::sync::Arc::clone(&market.engine),
                            meetpoint_appointments::SweeperConfig::default(),
                        );
                        sweeper.run_once().await.map(|_| AppointmentStatus::Requested)
                    },
                };
                if let Err(error) = &result {
                    prop_assert_ne!(error.kind(), ErrorKind::System);
                }

                let stored = market.engine.get(appointment.id).await.unwrap().appointment;
                if stored.status == AppointmentStatus::Confirmed {
                    was_confirmed = true;
                }
                if stored.status == AppointmentStatus::Completed {
                    prop_assert!(was_confirmed);
                    let ratings = market.backend.ratings.for_appointment(appointment.id).await.unwrap();
                    prop_assert_eq!(ratings.len(), 2);
                    prop_assert!(RatingDirection::ALL
                        .iter()
                        .all(|d| ratings.iter().any(|r| r.direction == *d)));
                }
                // Stock moves only with a confirmation
                let expected_stock = if was_confirmed { 0 } else { 1 };
                prop_assert_eq!(market.stock().await, expected_stock);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
