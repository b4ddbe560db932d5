//! Route definitions for the transcription resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::transcription;
use crate::state::AppState;

/// Transcript documents posted by the ML worker can be large.
const RESULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Routes mounted at `/api/upload-video`.
///
/// ```text
/// POST   /request-process       -> request_process
/// POST   /result                -> receive_result
/// GET    /status/{job_id}       -> get_status
/// GET    /ml-server/health      -> ml_server_health
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/request-process", post(transcription::request_process))
        .route(
            "/result",
            post(transcription::receive_result).layer(DefaultBodyLimit::max(RESULT_BODY_LIMIT)),
        )
        .route("/status/{job_id}", get(transcription::get_status))
        .route("/ml-server/health", get(transcription::ml_server_health))
}
