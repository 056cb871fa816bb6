//! `SwitchboardServer`: Axum HTTP + `WebSocket` relay server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::relay::{Hub, HubHandle};
use crate::websocket::session::run_ws_session;

/// Server startup failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Other socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay hub.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct SwitchboardServer {
    config: Arc<ServerConfig>,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    hub_cancel: CancellationToken,
    shutdown: CancellationToken,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl SwitchboardServer {
    /// Create the server and start its hub task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let (hub, handle) = Hub::new(&config);
        let hub_cancel = CancellationToken::new();
        let hub_task = tokio::spawn(hub.run(hub_cancel.clone()));
        Self {
            config: Arc::new(config),
            hub: handle,
            hub_task,
            hub_cancel,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(api::health))
            .route("/metrics", get(api::metrics))
            .route("/api/notify", post(api::notify_user))
            .route("/api/broadcast", post(api::broadcast))
            .route("/api/messages", post(api::message))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        let router = self.router();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local, "switchboard listening");
        Ok((local, handle))
    }

    /// Stop accepting, close sessions, then stop the hub.
    ///
    /// Waits at most `grace` for the serve task to drain.
    pub async fn shutdown(self, server: JoinHandle<()>, grace: Duration) {
        info!("shutting down");
        self.shutdown.cancel();
        if tokio::time::timeout(grace, server).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "server did not drain in time");
        }
        self.hub_cancel.cancel();
        let _ = self.hub_task.await;
        info!("shutdown complete");
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let AppState {
        hub,
        config,
        shutdown,
        ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, hub, config, shutdown))
}
