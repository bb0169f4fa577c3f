//! Route definitions for the `/animations` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::animations;
use crate::state::AppState;

/// Routes mounted at `/animations`.
///
/// ```text
/// POST   /                        -> create_animation
/// GET    /{job_handle}/status     -> get_animation_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(animations::create_animation))
        .route("/{job_handle}/status", get(animations::get_animation_status))
}
