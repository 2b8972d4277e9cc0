//! API error type and its HTTP mapping.
//!
//! Handlers return [`ApiError`]; the [`IntoResponse`] impl renders every
//! variant as `{"error": ...}` JSON with the matching status code.
//! Conversions from the store and pipeline error types centralize the
//! taxonomy: validation failures are 400s, conflicts resolve to 409 only
//! where a handler has not already absorbed them as idempotent no-ops,
//! and dependency failures surface as 5xx without leaking internals.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use flowtalk_pipeline::PipelineError;
use flowtalk_store::StoreError;

/// Alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body or query failed validation (400).
    #[error("invalid request: {}", reasons.join("; "))]
    Invalid { reasons: Vec<String> },

    /// Missing or invalid credentials (401).
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated but not allowed (403).
    #[error("forbidden")]
    Forbidden,

    /// The entity does not exist (404).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A write conflicted with existing state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The translator or store is unreachable (503).
    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    /// Anything else (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Shorthand for a single-reason validation failure.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reasons: vec![reason.into()],
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Invalid { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => Self::NotFound(entity),
            StoreError::Conflict { detail, .. } => Self::Conflict(detail),
            StoreError::InvalidArgument(reason) => Self::invalid(reason),
            StoreError::Sqlite(_) | StoreError::TaskJoin(_) | StoreError::Migration { .. } => {
                Self::Unavailable("storage unavailable".into())
            }
            StoreError::Json(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidContent { reasons } => Self::Invalid { reasons },
            PipelineError::TranslatorUnavailable { reason } => Self::Unavailable(reason),
            PipelineError::Repository { reason } => Self::Unavailable(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("message").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Unavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err: ApiError = StoreError::NotFound {
            entity: "message",
            id: "m1".into(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound("message")));
    }

    #[test]
    fn invalid_content_keeps_all_reasons() {
        let err: ApiError = PipelineError::InvalidContent {
            reasons: vec!["too long".into(), "script tags".into()],
        }
        .into();
        match err {
            ApiError::Invalid { reasons } => assert_eq!(reasons.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
