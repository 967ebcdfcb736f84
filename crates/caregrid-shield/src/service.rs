//! Service assembly and the HTTP entry point.
//!
//! [`ShieldServer`] wires the block store, event sink, and pipeline together,
//! wraps the application router in the [`ShieldLayer`], and serves it until
//! shutdown. A background task prunes idle guard state and sweeps expired
//! store entries on the configured interval.

use crate::domain::config::{SecurityProfile, ShieldConfig};
use crate::domain::error::ShieldError;
use crate::domain::events::TracingEventSink;
use crate::metrics::ShieldMetrics;
use crate::pipeline::{PipelineOrchestrator, ShieldLayer};
use crate::store::{BlockStore, MemoryBlockStore};
use axum::{response::IntoResponse, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shield service state
pub struct ShieldServer {
    config: ShieldConfig,
    orchestrator: Arc<PipelineOrchestrator>,
    store: Arc<MemoryBlockStore>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ShieldServer {
    /// Create a new shield server. The application router it protects is
    /// supplied at [`start`](Self::start); callers embedding the shield in an
    /// existing server use [`layer`](Self::layer) or
    /// [`protect`](Self::protect) instead.
    pub fn new(config: ShieldConfig) -> Result<Self, ShieldError> {
        config.validate()?;

        let store = Arc::new(MemoryBlockStore::new());
        let orchestrator = Arc::new(PipelineOrchestrator::from_config(
            &config,
            Arc::clone(&store) as Arc<dyn BlockStore>,
            Arc::new(TracingEventSink::new()),
        ));

        Ok(Self {
            config,
            orchestrator,
            store,
            shutdown_tx: None,
        })
    }

    /// Serve the protected router until shutdown or server error.
    pub async fn start(&mut self, app: Router) -> Result<(), ShieldError> {
        let addr = self.config.server_addr();

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        // Start background housekeeping
        self.start_cleanup_task();

        let router = self.protect(app);

        info!(
            addr = %addr,
            profile = self.config.profile.name.as_str(),
            "Starting shield server"
        );
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ShieldError::Bind(e.to_string()))?;

        // ConnectInfo must be threaded through so the layer can see the peer
        // address when no forwarding header is present.
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        });

        // Wait for shutdown signal or server error
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Received shutdown signal");
            }
            result = server => {
                match result {
                    Ok(Err(e)) => error!(error = %e, "Server error"),
                    Err(e) => error!(error = %e, "Server task failed"),
                    Ok(Ok(())) => {}
                }
            }
        }

        info!("Shield server stopped");
        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Wrap an application router with the shield layer and attach the
    /// operational routes. The shield sits outside `/health` and `/metrics`
    /// too; both survive it because GETs carry nothing the inspectors scan.
    pub fn protect(&self, app: Router) -> Router {
        let metrics = self.orchestrator.metrics();

        app.route("/health", get(health_check))
            .route(
                "/metrics",
                get(move || {
                    let metrics = Arc::clone(&metrics);
                    async move { Json(metrics.to_json()) }
                }),
            )
            .layer(self.layer())
            // Outermost, so rejected requests show up in request traces too
            .layer(TraceLayer::new_for_http())
    }

    /// The shield layer alone, for embedding in an existing middleware stack
    pub fn layer(&self) -> ShieldLayer {
        ShieldLayer::new(
            Arc::clone(&self.orchestrator),
            self.config.profile.max_request_bytes,
        )
    }

    /// Get the assembled pipeline
    pub fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<ShieldMetrics> {
        self.orchestrator.metrics()
    }

    /// Start the background cleanup task
    fn start_cleanup_task(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let store = Arc::clone(&self.store);
        let interval = self.config.cleanup_interval;
        let max_age = state_max_age(&self.config.profile);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                orchestrator.cleanup(max_age);
                store.sweep();
            }
        });
    }
}

/// Identity state idle longer than every detection window can no longer
/// influence any guard and is safe to drop.
fn state_max_age(profile: &SecurityProfile) -> Duration {
    profile
        .endpoint_window
        .max(profile.brute_force_window)
        .max(Duration::from_secs(60))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "caregrid-shield",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
