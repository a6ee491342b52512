//! Readiness probes.
//!
//! A probe times one dependency call and grades it: an error is
//! `unhealthy`, a success slower than the probe's budget is `degraded`.

use serde::Serialize;
use std::time::Duration;

/// Probe outcome, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Answered within budget
    Healthy,
    /// Answered, but slower than the budget
    Degraded,
    /// Did not answer
    Unhealthy,
}

impl HealthStatus {
    /// Whether traffic should stop being routed here
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

/// One graded dependency.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    /// Dependency name, e.g. `appointment_store`
    pub component: String,
    /// Grade
    pub status: HealthStatus,
    /// How long the probe took
    pub latency_ms: u64,
    /// Error or slowness detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Grade a finished probe against `budget`.
    #[must_use]
    pub fn grade<E: std::fmt::Display>(
        component: impl Into<String>,
        outcome: Result<(), E>,
        elapsed: Duration,
        budget: Duration,
    ) -> Self {
        let (status, message) = match outcome {
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Ok(()) if elapsed > budget => (
                HealthStatus::Degraded,
                Some(format!("answered in {}ms, budget {}ms", elapsed.as_millis(), budget.as_millis())),
            ),
            Ok(()) => (HealthStatus::Healthy, None),
        };
        Self {
            component: component.into(),
            status,
            latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            message,
        }
    }
}

/// Every probe of one readiness request.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst grade among `checks`
    pub status: HealthStatus,
    /// Individual probes
    pub checks: Vec<HealthCheck>,
    /// When the report was produced
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Combine probes; an empty report is healthy.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_millis(500);

    fn ok(component: &str, ms: u64) -> HealthCheck {
        HealthCheck::grade::<String>(component, Ok(()), Duration::from_millis(ms), BUDGET)
    }

    #[test]
    fn slow_answers_degrade() {
        assert_eq!(ok("appointment_store", 20).status, HealthStatus::Healthy);
        let slow = ok("appointment_store", 900);
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert_eq!(slow.latency_ms, 900);
        assert!(slow.message.is_some());
    }

    #[test]
    fn report_takes_worst_status() {
        let report = HealthReport::new(vec![ok("appointment_store", 1), ok("stock_ledger", 900)]);
        assert_eq!(report.status, HealthStatus::Degraded);

        let failed = HealthCheck::grade("appointment_store", Err("connection refused"), Duration::ZERO, BUDGET);
        let report = HealthReport::new(vec![ok("stock_ledger", 900), failed]);
        assert!(report.status.is_unhealthy());
    }

    #[test]
    fn empty_report_is_healthy() {
        assert_eq!(HealthReport::new(Vec::new()).status, HealthStatus::Healthy);
    }

    #[test]
    fn serializes_lowercase_status() {
        let json = serde_json::to_value(ok("appointment_store", 3)).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["latencyMs"], 3);
        assert!(json.get("message").is_none());
    }
}
