//! Reporting server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use csp_audit::AuditStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::create_router;
use crate::state::AppState;

/// Outcome of one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Audit events dropped for age.
    pub purged_events: usize,
    /// Idle rate limiter keys dropped.
    pub pruned_keys: usize,
    /// Rate limiter keys still tracked after the sweep.
    pub tracked_keys: usize,
}

/// Runs one maintenance sweep over the audit store and rate limiter.
pub fn run_maintenance(state: &AppState) -> MaintenanceReport {
    let report = MaintenanceReport {
        purged_events: state.store().purge_expired(),
        pruned_keys: state.limiter().prune(),
        tracked_keys: state.limiter().tracked_count(),
    };
    debug!(
        purged_events = report.purged_events,
        pruned_keys = report.pruned_keys,
        tracked_keys = report.tracked_keys,
        "Maintenance sweep complete"
    );
    report
}

/// Spawns a task that runs [`run_maintenance`] every `period`.
///
/// The first sweep happens one full period after the call. Abort the returned
/// handle to stop it.
pub fn spawn_maintenance(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_maintenance(&state);
        }
    })
}

/// Resolves once `signal` fires.
///
/// A signal source that fails to install is logged and never resolves, so the
/// server keeps running instead of shutting down at startup.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

/// HTTP server for CSP violation reporting.
#[derive(Debug, Clone)]
pub struct CspServer {
    state: Arc<AppState>,
}

impl CspServer {
    /// Create a new server with an in-memory audit store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Ok(Self {
            state: Arc::new(AppState::new(config)?),
        })
    }

    /// Create a new server around an existing audit store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_store(config: ServerConfig, store: Arc<dyn AuditStore>) -> ServerResult<Self> {
        Ok(Self {
            state: Arc::new(AppState::with_store(config, store)?),
        })
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Start the server and listen for connections.
    ///
    /// This method runs until the server encounters a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve(&self, addr: SocketAddr) -> ServerResult<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server and its maintenance task stop when `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;

        let local = listener.local_addr().unwrap_or(addr);
        info!(addr = %local, "CSP reporting server listening");

        let interval = self.state.config().maintenance_interval();
        let maintenance = spawn_maintenance(self.state(), interval);

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()));

        maintenance.abort();
        info!("CSP reporting server shut down");
        result
    }

    /// Create the router without starting the server.
    ///
    /// Useful for testing or embedding in another server.
    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }
}
