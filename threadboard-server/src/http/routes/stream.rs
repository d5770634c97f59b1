//! Live comment stream over server-sent events

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};

use crate::http::error::ApiError;
use crate::http::extractors::ValidPostId;
use crate::http::server::AppState;
use crate::models::Comment;

fn comment_event(comment: &Comment) -> Event {
    let event = Event::default()
        .event("comment")
        .id(comment.id.to_string());
    match serde_json::to_string(comment) {
        Ok(data) => event.data(data),
        Err(e) => {
            tracing::error!(comment_id = %comment.id, error = %e, "Failed to encode comment");
            event.comment("encoding failed")
        }
    }
}

/// GET /posts/{id}/comments/stream
///
/// One `comment` event per new comment. The subscription lives as long as
/// the response body, so a client disconnect unregisters it. Server
/// shutdown ends the stream.
async fn stream_comments(
    State(state): State<Arc<AppState>>,
    ValidPostId(post_id): ValidPostId,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state
        .service
        .subscribe_until(post_id, state.shutdown.clone().wait())
        .await?;
    tracing::info!(post_id = %post_id, "Stream opened");

    let events = subscription.map(|comment| Ok(comment_event(&comment)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/posts/{id}/comments/stream", get(stream_comments))
}

