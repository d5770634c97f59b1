//! Comment endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::extractors::ValidPostId;
use crate::http::server::AppState;
use crate::models::validation::positive_id;
use crate::models::{Comment, CommentId, CommentQuery, CommentQueryParams, NewComment};

/// Create comment request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub author: String,
    pub text: String,
    pub parent_id: Option<i64>,
}

/// GET /posts/{id}/comments?parentId=&limit=&afterId=
async fn list_comments(
    State(state): State<Arc<AppState>>,
    ValidPostId(post_id): ValidPostId,
    Query(params): Query<CommentQueryParams>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    if let Some(parent) = params.parent_id {
        positive_id("parentId", parent)?;
    }
    let query = CommentQuery::from(params);
    Ok(Json(state.service.get_comments(post_id, query).await?))
}

/// POST /posts/{id}/comments
async fn create_comment(
    State(state): State<Arc<AppState>>,
    ValidPostId(post_id): ValidPostId,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let parent_id = req
        .parent_id
        .map(|id| positive_id("parentId", id).map(CommentId))
        .transpose()?;

    let comment = NewComment::new(post_id, req.author, req.text);
    comment.validate()?;

    let created = state.service.create_comment(comment, parent_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/posts/{id}/comments", get(list_comments).post(create_comment))
}
