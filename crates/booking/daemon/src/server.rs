//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::{DaemonConfig, NotificationsConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::maintenance;
use booking_engine::{
    standard_registry, BookingOrchestrator, BookingStore, Clock, HttpNotificationGateway,
    InMemoryStore, LogNotificationGateway, NoopProfileDirectory, NotificationGateway, RunStore,
    SystemClock, WorkflowDeps,
};
use booking_engine::storage::PostgresStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Booking daemon server
pub struct Server {
    config: DaemonConfig,
    orchestrator: Arc<BookingOrchestrator>,
    clock: Arc<dyn Clock>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let (runs, bookings) = build_storage(&config.storage).await?;
        let notifications = build_gateway(&config.notifications)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let deps = WorkflowDeps {
            bookings,
            notifications,
            profiles: Arc::new(NoopProfileDirectory),
        };
        let registry = standard_registry(&deps)?;
        tracing::info!(definitions = registry.count(), "Workflow definitions registered");

        let orchestrator = Arc::new(BookingOrchestrator::new(
            registry,
            runs,
            clock.clone(),
            &config.engine,
        ));

        Ok(Self {
            config,
            orchestrator,
            clock,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let report = self.orchestrator.recover().await?;
        tracing::info!(
            sleeping = report.sleeping,
            redriven = report.redriven,
            "Recovered in-flight runs"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let timers = tokio::spawn(self.orchestrator.clone().run_timers(shutdown_rx.clone()));

        let maintenance = if self.config.maintenance.enabled {
            Some(tokio::spawn(maintenance::run(
                self.orchestrator.clone(),
                self.clock.clone(),
                Duration::from_secs(self.config.maintenance.interval_secs.max(1)),
                shutdown_rx,
            )))
        } else {
            None
        };

        let state = AppState::new(self.orchestrator.clone(), self.clock.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Booking daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Booking daemon shutting down");

        let _ = shutdown_tx.send(true);
        if let Err(e) = timers.await {
            tracing::warn!(error = %e, "Timer loop ended abnormally");
        }
        if let Some(handle) = maintenance {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Maintenance loop ended abnormally");
            }
        }

        Ok(())
    }
}

async fn build_storage(
    config: &StorageConfig,
) -> DaemonResult<(Arc<dyn RunStore>, Arc<dyn BookingStore>)> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; runs do not survive a restart");
            let store = Arc::new(InMemoryStore::new());
            Ok((store.clone(), store))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = Arc::new(
                PostgresStore::connect_with_options(url, *max_connections, *connect_timeout_secs)
                    .await?,
            );
            tracing::info!("Connected to PostgreSQL storage");
            Ok((store.clone(), store))
        }
    }
}

fn build_gateway(config: &NotificationsConfig) -> DaemonResult<Arc<dyn NotificationGateway>> {
    match config {
        NotificationsConfig::Log => Ok(Arc::new(LogNotificationGateway)),
        NotificationsConfig::Http {
            endpoint,
            shared_secret,
            timeout_secs,
        } => {
            if shared_secret.is_empty() {
                return Err(DaemonError::Config(
                    "notifications.shared_secret must not be empty".to_string(),
                ));
            }
            let gateway = HttpNotificationGateway::new(
                endpoint,
                shared_secret,
                Duration::from_secs(*timeout_secs),
            )?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
