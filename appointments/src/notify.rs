//! Notification emitters and best-effort delivery.

use crate::error::NotificationError;
use crate::ports::{AppointmentNotification, NotificationEmitter};
use async_trait::async_trait;
use meetpoint_runtime::metrics::NotificationMetrics;
use meetpoint_runtime::retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;
use std::time::Duration;

/// Deliver one notification with bounded retry.
///
/// Never fails: exhausted retries are logged and counted.
pub(crate) async fn deliver(
    emitter: Arc<dyn NotificationEmitter>,
    notification: AppointmentNotification,
    policy: RetryPolicy,
) {
    let result = retry_with_backoff(policy, || {
        let emitter = Arc::clone(&emitter);
        let notification = notification.clone();
        async move { emitter.emit(&notification).await }
    })
    .await;

    match result {
        Ok(()) => NotificationMetrics::record_sent(),
        Err(error) => {
            NotificationMetrics::record_failure();
            tracing::warn!(
                appointment_id = %notification.appointment_id,
                recipient = %notification.recipient,
                error = %error,
                "Dropping notification after retries"
            );
        },
    }
}

/// Emitter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

#[async_trait]
impl NotificationEmitter for TracingEmitter {
    async fn emit(&self, notification: &AppointmentNotification) -> Result<(), NotificationError> {
        tracing::info!(
            appointment_id = %notification.appointment_id,
            recipient = %notification.recipient,
            kind = ?notification.kind,
            "Notification"
        );
        Ok(())
    }
}

/// Emitter that POSTs each notification as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookEmitter {
    client: reqwest::Client,
    url: String,
}

impl WebhookEmitter {
    /// Build an emitter with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Target URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationEmitter for WebhookEmitter {
    async fn emit(&self, notification: &AppointmentNotification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOutbox;
    use crate::ports::NotificationKind;
    use crate::types::{AppointmentId, UserId};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyEmitter {
        failures_left: AtomicUsize,
        outbox: InMemoryOutbox,
    }

    #[async_trait]
    impl NotificationEmitter for FlakyEmitter {
        async fn emit(&self, notification: &AppointmentNotification) -> Result<(), NotificationError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(NotificationError::Delivery("connection reset".into()));
            }
            self.outbox.emit(notification).await
        }
    }

    fn notification() -> AppointmentNotification {
        AppointmentNotification {
            appointment_id: AppointmentId::new(),
            recipient: UserId::new(),
            kind: NotificationKind::AppointmentRequested,
            occurred_at: Utc::now(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn deliver_retries_transient_failures() {
        let outbox = InMemoryOutbox::new();
        let emitter = Arc::new(FlakyEmitter {
            failures_left: AtomicUsize::new(2),
            outbox: outbox.clone(),
        });

        deliver(emitter, notification(), fast()).await;
        assert_eq!(outbox.notifications().len(), 1);
    }

    #[tokio::test]
    async fn deliver_gives_up_quietly() {
        let outbox = InMemoryOutbox::new();
        let emitter = Arc::new(FlakyEmitter {
            failures_left: AtomicUsize::new(10),
            outbox: outbox.clone(),
        });

        deliver(emitter, notification(), fast()).await;
        assert!(outbox.notifications().is_empty());
    }

    #[tokio::test]
    async fn tracing_emitter_accepts_everything() {
        assert!(TracingEmitter.emit(&notification()).await.is_ok());
    }

    #[test]
    fn webhook_emitter_keeps_url() {
        let emitter = WebhookEmitter::new("http://localhost:9999/hooks", Duration::from_secs(2)).unwrap();
        assert_eq!(emitter.url(), "http://localhost:9999/hooks");
    }
}
