//! Post endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::http::error::ApiError;
use crate::http::extractors::ValidPostId;
use crate::http::server::AppState;
use crate::models::{NewPost, Post};

/// GET /posts - newest first
async fn list_posts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(state.service.get_posts().await?))
}

/// POST /posts
async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    req.validate()?;
    let post = state.service.create_post(req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts/{id}
async fn get_post(
    State(state): State<Arc<AppState>>,
    ValidPostId(id): ValidPostId,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.service.get_post(id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
}
