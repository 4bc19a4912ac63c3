use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use quill_types::api::{CreateCommentRequest, ListQuery, UpdateCommentRequest};
use quill_types::models::Comment;

use crate::error::ApiError;
use crate::listing::{self, PageRequest, comment_from_row};
use crate::policy::{Actor, Operation, authorize, ensure_can_mutate};
use crate::state::{AppState, run_db};

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::CreateComment)?;
    let content = non_empty_content(req.content)?;
    let post_id = req.post_id;

    let id = run_db(&state, move |db| db.create_comment(post_id, actor.id, &content))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    info!(comment_id = id, post_id, user_id = actor.id, "comment created");

    let comment = load_comment(&state, id).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /comments/post/{post_id}, public.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let req = PageRequest::from_query(query)?;
    Ok(Json(listing::list_comments(&state, post_id, req).await?))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::UpdateComment)?;

    let existing = load_comment(&state, id).await?;
    ensure_can_mutate(actor, Operation::UpdateComment, existing.user.id)?;

    let content = non_empty_content(req.content)?;
    if !run_db(&state, move |db| db.update_comment(id, &content)).await? {
        return Err(ApiError::not_found("Comment not found"));
    }

    info!(comment_id = id, actor_id = actor.id, "comment updated");

    Ok(Json(load_comment(&state, id).await?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::DeleteComment)?;

    let existing = load_comment(&state, id).await?;
    ensure_can_mutate(actor, Operation::DeleteComment, existing.user.id)?;

    if !run_db(&state, move |db| db.delete_comment(id)).await? {
        return Err(ApiError::not_found("Comment not found"));
    }

    info!(comment_id = id, actor_id = actor.id, "comment deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn load_comment(state: &AppState, id: i64) -> Result<Comment, ApiError> {
    run_db(state, move |db| db.get_comment(id))
        .await?
        .map(comment_from_row)
        .ok_or_else(|| ApiError::not_found("Comment not found"))
}

fn non_empty_content(content: String) -> Result<String, ApiError> {
    if content.trim().is_empty() {
        Err(ApiError::validation("content must not be empty"))
    } else {
        Ok(content)
    }
}
