//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly; no router is involved.

use assert_matches::assert_matches;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use hoit_api::error::AppError;
use hoit_core::error::CoreError;
use hoit_core::quota::{QuotaType, QuotaUsage};
use hoit_core::render_request::ValidationIssue;
use hoit_db::store::StoreError;
use hoit_pipeline::error::PipelineError;
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let id = Uuid::nil();
    let (status, json) = error_to_response(AppError::Core(CoreError::NotFound {
        entity: "Render job",
        id,
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("Render job with id {id} not found"));
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("fileKey is required".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "fileKey is required");
}

#[tokio::test]
async fn forbidden_and_unauthorized() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Forbidden("not yours".into()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");

    let (status, json) =
        error_to_response(AppError::Core(CoreError::Unauthorized("Invalid signature".into()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Invalid signature");
}

#[tokio::test]
async fn validation_error_carries_details() {
    let issues = vec![ValidationIssue::new("options.fps", "fps must be between 1 and 60")];
    let (status, json) = error_to_response(AppError::Validation(issues)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(
        json["details"],
        json!([{"field": "options.fps", "message": "fps must be between 1 and 60"}])
    );
}

#[tokio::test]
async fn quota_errors_split_policy_and_transient() {
    let (status, json) = error_to_response(AppError::QuotaExceeded {
        quota_type: QuotaType::Monthly,
        reason: "Monthly quota exceeded (100/100)".into(),
        usage: QuotaUsage { used: 100, limit: 100 },
    })
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "RENDER_QUOTA_MONTHLY_EXCEEDED");
    assert_eq!(json["error"], "Monthly quota exceeded (100/100)");

    let (status, json) = error_to_response(AppError::QuotaExceeded {
        quota_type: QuotaType::Concurrent,
        reason: "Too many concurrent jobs (2/2)".into(),
        usage: QuotaUsage { used: 2, limit: 2 },
    })
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["quota_type"], "concurrent");
}

#[tokio::test]
async fn invalid_callback_merges_detail_without_overwriting_code() {
    let mut detail = Map::new();
    detail.insert("received_body".into(), json!("{"));
    detail.insert("code".into(), json!("SHOULD_NOT_WIN"));
    let (status, json) = error_to_response(AppError::InvalidCallback {
        message: "Invalid JSON format".into(),
        detail,
    })
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_CALLBACK_PAYLOAD");
    assert_eq!(json["received_body"], "{");
}

#[tokio::test]
async fn pipeline_errors() {
    let (status, json) = error_to_response(AppError::Pipeline(PipelineError::Dispatch {
        code: "GPU_SERVER_503".into(),
        message: "no free GPU".into(),
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "GPU_SERVER_503");

    // Contention is transient, so clients get a retryable status.
    let (status, json) =
        error_to_response(AppError::Pipeline(PipelineError::Contended(Uuid::nil()))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");

    let (status, json) = error_to_response(AppError::Pipeline(PipelineError::QueueClosed)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn store_failures_are_sanitized() {
    let err = AppError::Store(StoreError::Unavailable("connection refused to 10.0.0.5".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    let message = json["error"].as_str().unwrap();
    assert!(!message.contains("10.0.0.5"));
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let (status, json) =
        error_to_response(AppError::InternalError("secret credentials leaked".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_matches!(json["error"].as_str(), Some(msg) if !msg.contains("secret"));
}
