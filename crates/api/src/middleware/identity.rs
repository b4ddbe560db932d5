//! Caller identity extractor.
//!
//! Authentication happens upstream of this service; the gateway forwards
//! the authenticated user as `X-User-Id`. Requests without the header are
//! anonymous.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use hoit_core::error::CoreError;
use hoit_core::types::UserId;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller of a request, if identified.
///
/// ```ignore
/// async fn my_handler(caller: Caller) -> AppResult<Json<()>> {
///     tracing::info!(user_id = ?caller.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<UserId>,
}

impl Caller {
    /// Reject access to a job owned by someone else. Unowned jobs are open
    /// to everyone.
    pub fn authorize(&self, owner: Option<&str>, action: &str) -> Result<(), AppError> {
        match owner {
            Some(owner) if self.user_id.as_deref() != Some(owner) => Err(AppError::Core(
                CoreError::Forbidden(format!("Cannot {action} another user's render job")),
            )),
            _ => Ok(()),
        }
    }

    /// The user id, or 401 for anonymous callers.
    pub fn require(&self) -> Result<&str, AppError> {
        self.user_id.as_deref().ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(format!(
                "Missing {USER_ID_HEADER} header"
            )))
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Caller::default());
        };
        let user_id = value
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{USER_ID_HEADER} must be valid ASCII")))?
            .trim();

        Ok(Caller {
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
        })
    }
}
