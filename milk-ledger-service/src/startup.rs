//! Application startup and lifecycle management.

use crate::config::{MilkLedgerConfig, StoreConfig};
use crate::handlers::{health, ledger, movements};
use crate::middleware::metrics::metrics_middleware;
use crate::services::{init_metrics, Database, LedgerStore, MemoryLedgerStore, MilkLedger};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: MilkLedger,
}

impl AppState {
    pub fn new(ledger: MilkLedger) -> Self {
        Self { ledger }
    }
}

/// Build the HTTP router: probes, metrics and the `/api/v1` ledger API.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ledger", get(ledger::get_ledger))
        .route("/ledger/adjustments", post(ledger::record_adjustment))
        .route("/ledger/balance", get(ledger::get_balance))
        .route("/ledger/summary", get(ledger::get_summary))
        .route("/ledger/audit", get(ledger::audit_ledger))
        .route(
            "/movements",
            get(movements::list_movements).post(movements::create_movement),
        )
        .route(
            "/movements/:movement_id",
            get(movements::get_movement)
                .put(movements::update_movement)
                .delete(movements::delete_movement),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: MilkLedgerConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    /// Has no effect on the in-memory store.
    pub async fn build_without_migrations(config: MilkLedgerConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: MilkLedgerConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn LedgerStore> = match &config.store {
            StoreConfig::Postgres(database) => {
                let db = Database::new(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                if run_migrations {
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                }

                Arc::new(db)
            }
            StoreConfig::Memory => {
                tracing::warn!("Using in-memory ledger store; data is lost on restart");
                Arc::new(MemoryLedgerStore::new())
            }
        };

        let state = AppState::new(MilkLedger::new(store));

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(http_port = port, "Milk ledger listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the ledger service backing this application.
    pub fn ledger(&self) -> &MilkLedger {
        &self.state.ledger
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "milk-ledger-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
