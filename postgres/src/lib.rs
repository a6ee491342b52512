//! `PostgreSQL` adapters for the appointment engine.
//!
//! Implements every storage port of `meetpoint-appointments` on one
//! connection pool:
//!
//! - [`PostgresAppointmentStore`]: compare-and-set transitions with
//!   `UPDATE ... WHERE id = $1 AND status = $2`
//! - [`PostgresStockLedger`]: single-statement check-and-subtract
//! - [`PostgresRatingLedger`]: `UNIQUE (appointment_id, direction)`
//! - [`PostgresCatalog`]: listings and weekly availability
//!
//! Reads and connection acquisition are retried on transient failures;
//! state-changing statements run once.
//!
//! # Example
//!
//! ```ignore
//! use meetpoint_postgres::{PoolSettings, PostgresBackend};
//!
//! let backend = PostgresBackend::connect("postgres://localhost/meetpoint", PoolSettings::default()).await?;
//! backend.migrate().await?;
//! let engine = AppointmentEngine::new(backend.ports(), env);
//! ```

mod appointments;
mod catalog;
mod error;
mod ratings;
mod stock;

pub use appointments::PostgresAppointmentStore;
pub use catalog::PostgresCatalog;
pub use ratings::PostgresRatingLedger;
pub use stock::PostgresStockLedger;

use meetpoint_appointments::{EnginePorts, StorageError};
use meetpoint_runtime::retry::{RetryPolicy, retry_with_predicate};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Connection pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Pool size
    pub max_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// All four adapters sharing one pool.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresBackend {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if no connection can be opened.
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("Failed to connect: {e}")))?;
        tracing::info!(max_connections = settings.max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::storage(),
        }
    }

    /// Replace the backoff used for reads
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Migration failed: {e}")))?;
        tracing::info!("Migrations applied");
        Ok(())
    }

    /// The shared pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Appointment store adapter
    #[must_use]
    pub fn appointments(&self) -> PostgresAppointmentStore {
        PostgresAppointmentStore::new(self.pool.clone(), self.retry.clone())
    }

    /// Stock ledger adapter
    #[must_use]
    pub fn stock(&self) -> PostgresStockLedger {
        PostgresStockLedger::new(self.pool.clone(), self.retry.clone())
    }

    /// Rating ledger adapter
    #[must_use]
    pub fn ratings(&self) -> PostgresRatingLedger {
        PostgresRatingLedger::new(self.pool.clone(), self.retry.clone())
    }

    /// Catalog adapter
    #[must_use]
    pub fn catalog(&self) -> PostgresCatalog {
        PostgresCatalog::new(self.pool.clone(), self.retry.clone())
    }

    /// Engine ports backed by this pool
    #[must_use]
    pub fn ports(&self) -> EnginePorts {
        EnginePorts {
            stock: Arc::new(self.stock()),
            appointments: Arc::new(self.appointments()),
            ratings: Arc::new(self.ratings()),
            catalog: Arc::new(self.catalog()),
        }
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool_size", &self.pool.size())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Run a read, retrying while the backend is unavailable.
pub(crate) async fn read<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    retry_with_predicate(policy.clone(), operation, StorageError::is_transient).await
}
