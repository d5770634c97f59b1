//! HTTP transport
//!
//! Axum server with:
//! - CORS (localhost only by default)
//! - Request tracing
//! - Graceful shutdown that ends live streams and closes the store
//! - JSON error responses
//! - Server-sent events for live comments

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{
    build_router, run_server, shutdown_channel, AppState, ServerConfig, ServerError,
    ShutdownSignal, ShutdownTrigger,
};
