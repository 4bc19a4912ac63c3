use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use quill_db::models::{NewPost, PostChanges};
use quill_types::api::{ListQuery, MessageResponse};

use crate::error::ApiError;
use crate::listing::{self, PageRequest};
use crate::policy::{Actor, Operation, authorize, ensure_can_mutate};
use crate::state::{AppState, run_db};
use crate::uploads::{ImageUpload, PostForm, read_post_form};

/// POST /posts: multipart `title`, `content`, optional `image`.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::CreatePost)?;

    let mut multipart = multipart.map_err(not_multipart)?;
    let form = read_post_form(&mut multipart, state.images.max_bytes()).await?;
    let title = required_text(form.title, "title")?;
    let content = required_text(form.content, "content")?;

    let image = store_image(&state, form.image.as_ref()).await?;

    let stored_image = image.clone();
    let inserted = run_db(&state, move |db| {
        db.create_post(&NewPost {
            title: &title,
            content: &content,
            image: stored_image.as_deref(),
            author_id: actor.id,
        })
    })
    .await;

    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            discard_image(&state, image.as_deref()).await;
            return Err(e);
        }
    };

    info!(post_id = id, author_id = actor.id, "post created");

    let post = listing::post_detail(&state, id).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts?page&limit&search
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::ReadPost)?;

    let req = PageRequest::from_query(query)?;
    Ok(Json(listing::list_posts(&state, req).await?))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::ReadPost)?;

    Ok(Json(listing::post_detail(&state, id).await?))
}

/// PATCH /posts/{id}: multipart, every field optional. Existence and
/// ownership are settled before the body is read.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::UpdatePost)?;

    let existing = run_db(&state, move |db| db.get_post(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    ensure_can_mutate(actor, Operation::UpdatePost, existing.author_id)?;

    let mut multipart = multipart.map_err(not_multipart)?;
    let PostForm { title, content, image } =
        read_post_form(&mut multipart, state.images.max_bytes()).await?;
    let title = optional_text(title, "title")?;
    let content = optional_text(content, "content")?;

    let new_image = store_image(&state, image.as_ref()).await?;

    let stored_image = new_image.clone();
    let updated = run_db(&state, move |db| {
        db.update_post(
            id,
            &PostChanges {
                title: title.as_deref(),
                content: content.as_deref(),
                image: stored_image.as_deref(),
            },
        )
    })
    .await;

    match updated {
        Ok(true) => {}
        Ok(false) => {
            discard_image(&state, new_image.as_deref()).await;
            return Err(ApiError::not_found("Post not found"));
        }
        Err(e) => {
            discard_image(&state, new_image.as_deref()).await;
            return Err(e);
        }
    }

    if new_image.is_some() {
        discard_image(&state, existing.image.as_deref()).await;
    }

    info!(post_id = id, actor_id = actor.id, "post updated");

    Ok(Json(listing::post_detail(&state, id).await?))
}

/// DELETE /posts/{id}. Comments go with the post; the image file is removed.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(actor, Operation::DeletePost)?;

    let existing = run_db(&state, move |db| db.get_post(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    ensure_can_mutate(actor, Operation::DeletePost, existing.author_id)?;

    if !run_db(&state, move |db| db.delete_post(id)).await? {
        return Err(ApiError::not_found(format!(
            "Post with ID {id} not found or already deleted."
        )));
    }

    discard_image(&state, existing.image.as_deref()).await;

    info!(post_id = id, actor_id = actor.id, "post deleted");

    Ok(Json(MessageResponse {
        message: "Post has been successfully deleted.".to_string(),
    }))
}

/// Applied only after the role, existence and ownership checks have passed.
fn not_multipart(rejection: MultipartRejection) -> ApiError {
    ApiError::validation(rejection.body_text())
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    optional_text(value, field)?.ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

/// A field that was sent must not be blank.
fn optional_text(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(ApiError::validation(format!("{field} must not be empty")))
        }
        other => Ok(other),
    }
}

async fn store_image(
    state: &AppState,
    image: Option<&ImageUpload>,
) -> Result<Option<String>, ApiError> {
    match image {
        Some(upload) => Ok(Some(state.images.save(upload).await?)),
        None => Ok(None),
    }
}

async fn discard_image(state: &AppState, stored: Option<&str>) {
    if let Some(stored) = stored {
        if let Err(e) = state.images.delete(stored).await {
            warn!("Failed to delete image {}: {}", stored, e);
        }
    }
}
