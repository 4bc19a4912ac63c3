use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
};
use tower_http::services::ServeDir;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::uploads::PUBLIC_PREFIX;
use crate::{auth, comments, posts};

/// Room for the non-image multipart fields around a maximum-size image.
const FORM_OVERHEAD_BYTES: usize = 256 * 1024;

/// Every route of the API. Transport layers (CORS, tracing) are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/comments/post/{post_id}", get(comments::list_comments));

    let protected_routes = Router::new()
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/comments", post(comments::create_comment))
        .route(
            "/comments/{id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let body_limit = state.images.max_bytes() + FORM_OVERHEAD_BYTES;
    let images = ServeDir::new(state.images.dir());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(&format!("/{PUBLIC_PREFIX}"), images)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
