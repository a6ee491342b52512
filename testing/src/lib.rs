//! # Meetpoint Testing
//!
//! Deterministic clocks and a Given/When/Then harness for reducers.
//!
//! ## Example
//!
//! ```ignore
//! use meetpoint_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LifecycleReducer)
//!     .with_env(test_environment(test_clock()))
//!     .given_state(LifecycleState::default())
//!     .when_action(request_command())
//!     .then_state(|state| assert!(state.appointment.is_some()))
//!     .run();
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use meetpoint_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Clock implementations for tests.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use meetpoint_testing::mocks::FixedClock;
    /// use meetpoint_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// engine and advance time through another.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

pub use mocks::{FixedClock, ManualClock};

/// 2025-01-01 00:00:00 UTC, the instant every test clock starts from.
#[must_use]
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Fixed clock at [`test_epoch`].
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_epoch())
}

/// Manual clock starting at [`test_epoch`].
#[must_use]
pub fn manual_clock() -> ManualClock {
    ManualClock::new(test_epoch())
}
