//! Route definitions for the render resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use hoit_core::render_request::MAX_SCENARIO_BYTES;

use crate::handlers::render;
use crate::state::AppState;

/// Room for the largest accepted scenario plus the rest of the request.
const CREATE_BODY_LIMIT: usize = MAX_SCENARIO_BYTES + 1024 * 1024;

/// Routes mounted at `/api/render`.
///
/// ```text
/// POST   /create                -> create_render
/// GET    /history               -> render_history
/// GET    /quota                 -> render_quota
/// GET    /usage                 -> render_usage
/// POST   /callback              -> render_callback
/// GET    /gpu-server/health     -> gpu_server_health
/// GET    /{job_id}/status       -> render_status
/// POST   /{job_id}/cancel       -> cancel_render
/// DELETE /{job_id}              -> delete_render
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/create",
            post(render::create_render).layer(DefaultBodyLimit::max(CREATE_BODY_LIMIT)),
        )
        .route("/history", get(render::render_history))
        .route("/quota", get(render::render_quota))
        .route("/usage", get(render::render_usage))
        .route("/callback", post(render::render_callback))
        .route("/gpu-server/health", get(render::gpu_server_health))
        .route("/{job_id}/status", get(render::render_status))
        .route("/{job_id}/cancel", post(render::cancel_render))
        .route("/{job_id}", delete(render::delete_render))
}
