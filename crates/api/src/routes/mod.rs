pub mod health;
pub mod render;
pub mod transcription;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /upload-video/request-process          start a transcription (POST)
/// /upload-video/result                   ML worker webhook (POST)
/// /upload-video/status/{job_id}          transcription status
/// /upload-video/ml-server/health         ML worker probe
///
/// /render/create                         submit a render (POST)
/// /render/{job_id}                       delete a finished render (DELETE)
/// /render/{job_id}/status                render status
/// /render/{job_id}/cancel                cancel a render (POST)
/// /render/history                        caller's finished renders
/// /render/quota                          caller's limits and usage
/// /render/usage                          caller's daily usage
/// /render/callback                       GPU worker webhook (POST)
/// /render/gpu-server/health              GPU worker probe
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/upload-video", transcription::router())
        .nest("/render", render::router())
}
