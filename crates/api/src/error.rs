use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hoit_core::error::CoreError;
use hoit_core::quota::{QuotaType, QuotaUsage};
use hoit_core::render_request::ValidationIssue;
use hoit_db::store::StoreError;
use hoit_pipeline::error::PipelineError;
use serde_json::{json, Map, Value};

/// Application-level error type for HTTP handlers.
///
/// Every variant renders as `{"error": <message>, "code": <CODE>}`, plus
/// variant-specific fields for validation, quota and callback errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `hoit_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Render request failed field validation.
    #[error("Validation failed: {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// The caller is over a render limit.
    #[error("{reason}")]
    QuotaExceeded {
        quota_type: QuotaType,
        reason: String,
        usage: QuotaUsage,
    },

    /// A worker callback body that could not be decoded. `detail` carries
    /// the diagnostic fields merged into the response body.
    #[error("Invalid callback payload: {message}")]
    InvalidCallback { message: String, detail: Map<String, Value> },

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Rendered = (StatusCode, String, String, Map<String, Value>);

fn plain(status: StatusCode, code: &str, message: String) -> Rendered {
    (status, code.to_string(), message, Map::new())
}

fn internal() -> Rendered {
    plain(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, extra) = match self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Store(err) => classify_store_error(&err),
            AppError::Pipeline(err) => classify_pipeline_error(err),

            AppError::BadRequest(msg) => plain(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Validation(issues) => {
                let mut extra = Map::new();
                extra.insert("details".to_string(), json!(issues));
                (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR".to_string(),
                    "Render request validation failed".to_string(),
                    extra,
                )
            }
            AppError::QuotaExceeded { quota_type, reason, usage } => {
                let status = if quota_type.is_transient() {
                    StatusCode::TOO_MANY_REQUESTS
                } else {
                    StatusCode::FORBIDDEN
                };
                let mut extra = Map::new();
                extra.insert("quota_type".to_string(), json!(quota_type));
                extra.insert("usage".to_string(), json!(usage));
                (status, quota_type.error_code(), reason, extra)
            }
            AppError::InvalidCallback { message, detail } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_CALLBACK_PAYLOAD".to_string(),
                message,
                detail,
            ),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message));
        body.insert("code".to_string(), Value::String(code));
        for (key, value) in extra {
            body.entry(key).or_insert(value);
        }

        (status, axum::Json(Value::Object(body))).into_response()
    }
}

fn classify_core_error(err: CoreError) -> Rendered {
    match err {
        CoreError::NotFound { entity, id } => plain(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => plain(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
        CoreError::Conflict(msg) => plain(StatusCode::CONFLICT, "CONFLICT", msg),
        CoreError::Unauthorized(msg) => plain(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
        CoreError::Forbidden(msg) => plain(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn classify_store_error(err: &StoreError) -> Rendered {
    match err {
        StoreError::Database(db) => classify_sqlx_error(db),
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Store unavailable");
            internal()
        }
    }
}

fn classify_pipeline_error(err: PipelineError) -> Rendered {
    match err {
        PipelineError::Store(store) => classify_store_error(&store),
        PipelineError::NotFound { entity, id } => plain(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        PipelineError::Dispatch { code, message } => {
            (StatusCode::BAD_GATEWAY, code, message, Map::new())
        }
        PipelineError::Contended(id) => plain(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            format!("Job {id} is being updated concurrently, retry the request"),
        ),
        PipelineError::QueueClosed => plain(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Server is shutting down".to_string(),
        ),
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> Rendered {
    match err {
        sqlx::Error::RowNotFound => plain(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return plain(
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
