//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C: live streams are ended, open
//!   requests drain for at most `SHUTDOWN_GRACE`, then the store is closed

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;
use crate::error::StoreError;
use crate::service::BoardService;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cors_permissive: false,
        }
    }
}

/// Longest time open requests may drain after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: BoardService,
    /// Ends live comment streams when the server starts draining.
    pub shutdown: ShutdownSignal,
}

/// Resolves once the server begins shutting down.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Owning half of a [`ShutdownSignal`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Create a linked trigger and signal.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        shutdown_channel().1
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the trigger to fire. A trigger dropped unfired never fires.
    pub async fn wait(mut self) {
        let fired = self.rx.wait_for(|fired| *fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

fn cors_layer(permissive: bool) -> CorsLayer {
    if permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:8080"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://127.0.0.1:8080"),
        ])
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the full router around a service.
///
/// Comment streams end when `shutdown` fires.
pub fn build_router(
    service: BoardService,
    config: &ServerConfig,
    shutdown: ShutdownSignal,
) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::posts::router())
        .merge(routes::comments::router())
        .merge(routes::stream::router())
        .layer(cors_layer(config.cors_permissive))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState { service, shutdown }))
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Example
///
/// ```ignore
/// let store = open_storage(&board_config).await?;
/// let service = BoardService::new(store, CommentBroadcaster::new(64));
/// run_server(service, ServerConfig::default()).await?;
/// ```
pub async fn run_server(service: BoardService, config: ServerConfig) -> Result<(), ServerError> {
    let (trigger, shutdown) = shutdown_channel();
    let app = build_router(service.clone(), &config, shutdown);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let graceful = async move {
        shutdown_signal().await;
        trigger.fire();
        let _ = draining_tx.send(());
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    let drain_deadline = async {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(SHUTDOWN_GRACE).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => {
            tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Open connections did not drain in time");
        }
    }

    service.close().await?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
