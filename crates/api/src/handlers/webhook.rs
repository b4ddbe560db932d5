//! Shared intake for worker callbacks: signature check and body decoding
//! with diagnostics.

use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use hoit_core::error::CoreError;
use hoit_core::signature::{check_signature, SignatureCheck, SIGNATURE_HEADER};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::AppError;

/// Characters of a rejected body echoed back in the 422 response.
pub const RECEIVED_BODY_PREVIEW: usize = 500;

/// Characters of the body included in the intake log line.
const LOGGED_BODY_PREVIEW: usize = 200;

/// Where clients should poll for transcription status.
pub const STATUS_ENDPOINT_HINT: &str = "GET /api/upload-video/status/{job_id}";

/// Which webhook a body was posted to. Controls the 422 guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Transcription,
    Render,
}

impl WebhookKind {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Transcription => "POST /api/upload-video/result",
            Self::Render => "POST /api/render/callback",
        }
    }

    fn expected_format(self) -> Value {
        match self {
            Self::Transcription => json!({
                "job_id": "string (required)",
                "status": "string (required)",
                "progress": "integer (optional)",
                "message": "string (optional)",
                "result": "object (optional)",
                "error_message": "string (optional)",
                "error_code": "string (optional)",
            }),
            Self::Render => json!({
                "job_id": "string (required)",
                "status": "string (required)",
                "progress": "integer (optional)",
                "estimated_time_remaining": "integer (optional)",
                "download_url": "string (optional)",
                "file_size": "integer (optional)",
                "duration": "number (optional)",
                "error_message": "string (optional)",
                "error_code": "string (optional)",
            }),
        }
    }
}

/// Verify the optional `X-Signature-256` header. Unsigned callbacks and
/// signed callbacks without a configured secret are let through.
pub fn authenticate(secret: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match check_signature(secret, body, header) {
        SignatureCheck::Invalid => {
            tracing::warn!("Callback signature verification failed");
            Err(AppError::Core(CoreError::Unauthorized("Invalid signature".into())))
        }
        SignatureCheck::NoSecretConfigured => {
            tracing::warn!("Callback signature provided but no webhook secret configured");
            Ok(())
        }
        SignatureCheck::Verified | SignatureCheck::Unsigned => Ok(()),
    }
}

/// Decode a callback body into `T`, producing a diagnostic 422 on failure.
pub fn decode<T: DeserializeOwned>(
    kind: WebhookKind,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, AppError> {
    let text = String::from_utf8_lossy(body);
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::debug!(
        endpoint = kind.endpoint(),
        user_agent,
        body = %preview(&text, LOGGED_BODY_PREVIEW),
        "Callback body received",
    );

    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(endpoint = kind.endpoint(), error = %e, "Callback body is not valid JSON");
            let mut detail = Map::new();
            detail.insert("message".into(), json!(e.to_string()));
            detail.insert("received_body".into(), json!(preview(&text, RECEIVED_BODY_PREVIEW)));
            return Err(AppError::InvalidCallback {
                message: "Invalid JSON format".into(),
                detail,
            });
        }
    };

    serde_json::from_value(value.clone()).map_err(|e| {
        let validation = e.to_string();
        tracing::error!(endpoint = kind.endpoint(), user_agent, error = %validation, "Callback body failed validation");

        let mut detail = Map::new();
        detail.insert("validation_error".into(), json!(validation));
        detail.insert("received_body".into(), json!(preview(&text, RECEIVED_BODY_PREVIEW)));

        let message = if looks_like_client_call(kind, user_agent, &value) {
            detail.insert("correct_endpoint".into(), json!(STATUS_ENDPOINT_HINT));
            detail.insert("wrong_endpoint".into(), json!(kind.endpoint()));
            "This endpoint only accepts worker callbacks; clients should poll the status endpoint"
        } else {
            detail.insert("expected_format".into(), kind.expected_format());
            "Invalid request format"
        };
        AppError::InvalidCallback {
            message: message.into(),
            detail,
        }
    })
}

/// A body without a `status` field, or one sent by a Node HTTP client,
/// is almost always a frontend polling the wrong endpoint.
fn looks_like_client_call(kind: WebhookKind, user_agent: &str, body: &Value) -> bool {
    kind == WebhookKind::Transcription
        && (user_agent == "node" || body.get("status").map_or(true, |s| !s.is_string()))
}

/// First `max` characters of `text`.
fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
