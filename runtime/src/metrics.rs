//! Prometheus metrics for the appointment engine.
//!
//! Metric names:
//! - `appointment_transitions_total{transition}`
//! - `appointment_conflicts_total{code}`
//! - `engine_command_duration_seconds{command}`
//! - `sweeper_runs_total`, `sweeper_expired_total`, `sweeper_completed_total`,
//!   `sweeper_failures_total`, `sweeper_stale_confirmed`
//! - `notifications_sent_total`, `notifications_failed_total`
//! - `effects_executed_total`, `effect_batch_duration_seconds`
//! - `retry_attempts_total`, `retry_successes_total`, `retry_exhausted_total`
//!
//! # Example
//!
//! ```rust,no_run
//! use meetpoint_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // The server binary exposes `server.render()` at /metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound (later) to `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should listen on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// A recorder that is already installed (several servers in one test
    /// binary) is tolerated; `handle()` stays `None` in that case.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Engine
    describe_counter!(
        "appointment_transitions_total",
        "Appointment state transitions committed, by transition"
    );
    describe_counter!(
        "appointment_conflicts_total",
        "Commands rejected by a conflict, by error code"
    );
    describe_histogram!(
        "engine_command_duration_seconds",
        "Time taken to process an engine command"
    );

    // Sweeper
    describe_counter!("sweeper_runs_total", "Completed sweeper passes");
    describe_counter!(
        "sweeper_expired_total",
        "Requested appointments expired by the sweeper"
    );
    describe_counter!(
        "sweeper_completed_total",
        "Confirmed appointments completed by closure reconciliation"
    );
    describe_counter!(
        "sweeper_failures_total",
        "Per-appointment failures during a sweeper pass"
    );
    describe_gauge!(
        "sweeper_stale_confirmed",
        "Confirmed appointments past their window longer than the stale threshold"
    );

    // Notifications
    describe_counter!("notifications_sent_total", "Notifications delivered");
    describe_counter!(
        "notifications_failed_total",
        "Notifications dropped after retries were exhausted"
    );

    // Effects
    describe_counter!("effects_executed_total", "Effect futures executed");
    describe_histogram!(
        "effect_batch_duration_seconds",
        "Time taken to run a batch of effects"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_successes_total",
        "Operations that succeeded after at least one retry"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Operations that exhausted their retry budget"
    );
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record a committed transition such as `requested_to_confirmed`.
    pub fn record_transition(transition: &'static str) {
        counter!("appointment_transitions_total", "transition" => transition).increment(1);
    }

    /// Record a command rejected with a conflict code.
    pub fn record_conflict(code: &'static str) {
        counter!("appointment_conflicts_total", "code" => code).increment(1);
    }

    /// Record how long a command took.
    pub fn record_command(command: &'static str, duration: Duration) {
        histogram!("engine_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }
}

/// Sweeper metrics recorder.
pub struct SweeperMetrics;

impl SweeperMetrics {
    /// Record one finished pass.
    pub fn record_run(expired: usize, completed: usize, failures: usize) {
        counter!("sweeper_runs_total").increment(1);
        counter!("sweeper_expired_total").increment(expired as u64);
        counter!("sweeper_completed_total").increment(completed as u64);
        counter!("sweeper_failures_total").increment(failures as u64);
    }

    /// Publish the current stale-confirmed count.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_stale_confirmed(count: usize) {
        gauge!("sweeper_stale_confirmed").set(count as f64);
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a delivered notification.
    pub fn record_sent() {
        counter!("notifications_sent_total").increment(1);
    }

    /// Record a notification given up on.
    pub fn record_failure() {
        counter!("notifications_failed_total").increment(1);
    }
}

/// Effect metrics recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record a batch of `count` effect futures and its wall time.
    pub fn record_execution(count: usize, duration: Duration) {
        counter!("effects_executed_total").increment(count as u64);
        histogram!("effect_batch_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
