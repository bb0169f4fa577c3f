pub mod animations;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /animations    animation dispatch and status
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/animations", animations::router())
}
