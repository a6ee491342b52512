//! # Meetpoint Runtime
//!
//! The imperative half of the architecture: once the engine has made a
//! reducer decision durable, the effects that decision described are handed
//! to the [`EffectRunner`] here.
//!
//! ## Components
//!
//! - **`EffectRunner`**: executes effect descriptions, either awaited or spawned
//! - **`retry`**: bounded exponential backoff for storage adapters and emitters
//! - **`metrics`**: Prometheus metric descriptions and recorders
//! - **`health`**: component health reports for readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use meetpoint_runtime::EffectRunner;
//!
//! let effects = reducer.reduce(&mut state, action, &env);
//! // Fire-and-forget: notifications never block the caller
//! EffectRunner::spawn(effects);
//! ```

use futures::future::join_all;
use meetpoint_core::effect::Effect;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Component health reporting
pub mod health;

pub use health::{HealthCheck, HealthReport, HealthStatus};

/// Error types for effect execution
pub mod error {
    use thiserror::Error;

    /// Errors that can occur while executing effects
    #[derive(Error, Debug)]
    pub enum RuntimeError {
        /// A spawned effect task panicked or was aborted
        #[error("Effect task failed: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),
    }
}

pub use error::RuntimeError;

type BoxedEffectFuture<A> = Pin<Box<dyn Future<Output = Option<A>> + Send>>;

/// Executes effect descriptions returned by reducers.
///
/// Parallel effects are flattened and every future is polled concurrently.
/// Actions produced by the futures are returned to the caller rather than
/// fed back into a reducer; the engine has no feedback loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectRunner;

impl EffectRunner {
    /// Run all effects to completion and collect the actions they produced.
    pub async fn run<A>(effects: impl IntoIterator<Item = Effect<A>>) -> Vec<A>
    where
        A: Send + 'static,
    {
        let mut futures: Vec<BoxedEffectFuture<A>> = Vec::new();
        for effect in effects {
            flatten(effect, &mut futures);
        }

        if futures.is_empty() {
            return Vec::new();
        }

        let count = futures.len();
        let started = Instant::now();
        let results = join_all(futures).await;
        metrics::EffectMetrics::record_execution(count, started.elapsed());

        results.into_iter().flatten().collect()
    }

    /// Spawn the effects on the current tokio runtime.
    ///
    /// The returned handle may be awaited (tests do this to observe
    /// notifications deterministically) or dropped to detach.
    pub fn spawn<A>(effects: impl IntoIterator<Item = Effect<A>>) -> EffectHandle<A>
    where
        A: Send + 'static,
    {
        let effects: Vec<Effect<A>> = effects.into_iter().collect();
        EffectHandle {
            task: tokio::spawn(Self::run(effects)),
        }
    }
}

fn flatten<A>(effect: Effect<A>, out: &mut Vec<BoxedEffectFuture<A>>) {
    match effect {
        Effect::None => {},
        Effect::Parallel(effects) => {
            for effect in effects {
                flatten(effect, out);
            }
        },
        Effect::Future(future) => out.push(future),
    }
}

/// Handle to a batch of spawned effects.
#[derive(Debug)]
pub struct EffectHandle<A> {
    task: JoinHandle<Vec<A>>,
}

impl<A> EffectHandle<A> {
    /// Wait for every effect in the batch to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TaskJoinError`] if the effect task panicked.
    pub async fn wait(self) -> Result<Vec<A>, RuntimeError> {
        Ok(self.task.await?)
    }

    /// Whether every effect in the batch has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
