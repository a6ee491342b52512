//! Meetpoint server
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Opens the storage backend (in-memory or `PostgreSQL`, migrated)
//! - Installs the Prometheus recorder and serves `/metrics`
//! - Runs the expiry sweeper in the background
//! - Serves the HTTP API until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! STORAGE_BACKEND=postgres DATABASE_URL=postgres://... cargo run --bin meetpoint-server
//! ```

mod config;

use anyhow::Context;
use axum::{Router, routing::get};
use config::{Config, LogFormat, StorageBackend};
use meetpoint_appointments::ports::NotificationEmitter;
use meetpoint_appointments::{
    AppointmentEngine, EnginePorts, ExpirySweeper, InMemoryBackend, LifecycleEnvironment, LifecycleSettings,
    SweeperConfig, TracingEmitter, WebhookEmitter,
};
use meetpoint_core::environment::SystemClock;
use meetpoint_postgres::{PoolSettings, PostgresBackend};
use meetpoint_runtime::metrics::MetricsServer;
use meetpoint_web::{AppState, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    info!(
        http = %config.http_addr,
        metrics = %config.metrics_addr,
        storage = ?config.storage,
        "Configuration loaded"
    );

    let ports = open_storage(&config).await?;
    let emitter = notification_emitter(&config)?;
    let env = LifecycleEnvironment::new(Arc::new(SystemClock), emitter).with_settings(LifecycleSettings {
        rating_requires_elapsed_window: config.rating_requires_elapsed_window,
    });
    let engine = Arc::new(AppointmentEngine::new(ports, env));

    let (shutdown_tx, _) = broadcast::channel(1);
    let metrics_task = start_metrics(&config, shutdown_tx.subscribe()).await?;

    let sweeper = ExpirySweeper::new(
        Arc::clone(&engine),
        SweeperConfig {
            interval: config.sweeper.interval,
            batch_size: config.sweeper.batch_size,
            stale_after: config.sweeper.stale_after,
        },
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_tx.subscribe()));
    info!(interval = ?config.sweeper.interval, "Expiry sweeper started");

    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    info!(address = %config.http_addr, "HTTP server listening");

    let app = router(AppState::new(Arc::clone(&engine)));
    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signal_tx.send(());
        })
        .await
        .context("HTTP server failed")?;

    info!(budget = ?config.shutdown_timeout, "Shutting down gracefully...");
    let _ = shutdown_tx.send(());
    let drain = async {
        if let Err(e) = sweeper_task.await {
            error!(error = %e, "Sweeper task panicked");
        }
        engine.flush_notifications().await;
        if let Some(task) = metrics_task {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!("Shutdown budget exhausted; abandoning in-flight work");
    }

    info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,meetpoint=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

async fn open_storage(config: &Config) -> anyhow::Result<EnginePorts> {
    match config.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            Ok(InMemoryBackend::new().ports())
        },
        StorageBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let backend = PostgresBackend::connect(
                &config.database.url,
                PoolSettings {
                    max_connections: config.database.max_connections,
                    connect_timeout: config.database.connect_timeout,
                },
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            backend.migrate().await.context("Failed to run migrations")?;
            info!("PostgreSQL connected and migrated");
            Ok(backend.ports())
        },
    }
}

fn notification_emitter(config: &Config) -> anyhow::Result<Arc<dyn NotificationEmitter>> {
    match &config.notification_webhook_url {
        Some(url) => {
            let emitter = WebhookEmitter::new(url.clone(), WEBHOOK_TIMEOUT).context("Failed to build webhook client")?;
            info!(url = %emitter.url(), "Notifications delivered by webhook");
            Ok(Arc::new(emitter))
        },
        None => {
            info!("Notifications logged only");
            Ok(Arc::new(TracingEmitter))
        },
    }
}

/// Install the recorder and serve `/metrics` until shutdown.
///
/// Returns `None` when another recorder was already installed.
async fn start_metrics(
    config: &Config,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<Option<tokio::task::JoinHandle<()>>> {
    let mut metrics = MetricsServer::new(config.metrics_addr);
    metrics.start().context("Failed to start metrics exporter")?;
    let Some(handle) = metrics.handle().cloned() else {
        return Ok(None);
    };

    let listener = TcpListener::bind(metrics.addr())
        .await
        .with_context(|| format!("Failed to bind {}", metrics.addr()))?;
    info!(address = %metrics.addr(), "Metrics endpoint listening");

    let app = Router::new().route("/metrics", get(move || std::future::ready(handle.render())));
    Ok(Some(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = served {
            error!(error = %e, "Metrics server failed");
        }
    })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
