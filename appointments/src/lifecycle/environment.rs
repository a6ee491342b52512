use crate::ports::NotificationEmitter;
use meetpoint_core::environment::Clock;
use meetpoint_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// Tunables that change guard behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleSettings {
    /// Accept ratings only once the scheduled window has passed
    pub rating_requires_elapsed_window: bool,
}

/// Environment dependencies for the lifecycle reducer
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Clock for guards and timestamps
    pub clock: Arc<dyn Clock>,
    /// Where notification effects deliver to
    pub emitter: Arc<dyn NotificationEmitter>,
    /// Backoff for notification delivery
    pub notification_retry: RetryPolicy,
    /// Guard settings
    pub settings: LifecycleSettings,
}

impl LifecycleEnvironment {
    /// Creates a new `LifecycleEnvironment` with default settings
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, emitter: Arc<dyn NotificationEmitter>) -> Self {
        Self {
            clock,
            emitter,
            notification_retry: RetryPolicy::notifications(),
            settings: LifecycleSettings::default(),
        }
    }

    /// Replace the guard settings
    #[must_use]
    pub const fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the notification backoff
    #[must_use]
    pub fn with_notification_retry(mut self, policy: RetryPolicy) -> Self {
        self.notification_retry = policy;
        self
    }
}

impl std::fmt::Debug for LifecycleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEnvironment")
            .field("now", &self.clock.now())
            .field("notification_retry", &self.notification_retry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
