//! Web server for fileshare.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::file::QuotaAccountant;
use crate::FileService;

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Allowed CORS origins.
    cors_origins: Vec<String>,
    /// Usage reconciliation interval, when usage is tracked.
    reconcile_interval: Option<Duration>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, service: FileService) -> Result<Self, AddrParseError> {
        let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;

        let reconcile_interval = service
            .quota()
            .is_tracking()
            .then(|| Duration::from_secs(config.storage.reconcile_interval_secs));

        let app_state = AppState::new(service, config.storage.max_upload_size_bytes());

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            cors_origins: config.server.cors_origins.clone(),
            reconcile_interval,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the complete application router.
    pub fn router(&self) -> Router {
        create_router(self.app_state.clone(), &self.cors_origins)
            .merge(create_health_router())
            .layer(CompressionLayer::new())
    }

    /// Start the usage reconciliation background task.
    ///
    /// Re-walks the shared root on every tick and replaces the tracked
    /// used-byte counter, correcting drift from changes made outside the API.
    fn start_usage_reconcile_task(quota: QuotaAccountant, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                let quota = quota.clone();
                match tokio::task::spawn_blocking(move || quota.reconcile()).await {
                    Ok(used) => tracing::debug!(used_bytes = used, "Reconciled storage usage"),
                    Err(e) => tracing::warn!(error = %e, "Usage reconciliation failed"),
                }
            }
        });
    }

    async fn bind(self) -> Result<(TcpListener, Router), std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;

        if let Some(every) = self.reconcile_interval {
            Self::start_usage_reconcile_task(self.app_state.service.quota().clone(), every);
            tracing::info!(
                interval_secs = every.as_secs(),
                "Usage reconciliation task started"
            );
        }

        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let (listener, router) = self.bind().await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// Useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr, std::io::Error> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
