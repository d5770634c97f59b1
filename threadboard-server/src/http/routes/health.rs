//! Liveness plus a snapshot of the board's storage and live fan-out

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::http::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub draining: bool,
    pub observers: usize,
    pub delivered: u64,
    pub dropped: u64,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let draining = state.shutdown.is_fired();
    let stats = state.service.broadcast_stats();

    Json(HealthResponse {
        status: if draining { "draining" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        storage: state.service.storage_kind().as_str(),
        draining,
        observers: stats.observers,
        delivered: stats.delivered,
        dropped: stats.dropped,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::CommentBroadcaster;
    use crate::http::server::shutdown_channel;
    use crate::models::PostId;
    use crate::service::BoardService;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn reports_storage_and_observers() {
        let (trigger, shutdown) = shutdown_channel();
        let service = BoardService::new(Arc::new(MemoryStore::new()), CommentBroadcaster::new(4));
        let _sub = service.broadcaster().subscribe(PostId(1));
        let state = Arc::new(AppState { service, shutdown });

        let Json(body) = health(State(state.clone())).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.storage, "inmemory");
        assert_eq!(body.observers, 1);

        trigger.fire();
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "draining");
        assert!(body.draining);
    }
}
