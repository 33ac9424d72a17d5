//! HTTP API error types.
//!
//! One `ApiError` for the whole HTTP layer; its `IntoResponse` impl is the
//! single place engine failures become status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use acp_api_types::PrConflictBody;
use acp_engine::error::{EngineError, OpenPrConflict};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 409 carrying the details of the open pull request.
    #[error("an open pull request already exists")]
    OpenPrConflict(PrConflictBody),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Invalid(m) => ApiError::BadRequest(m),
            EngineError::Unauthorized => ApiError::Unauthorized,
            EngineError::Forbidden(m) => ApiError::Forbidden(m),
            EngineError::NotFound(m) => ApiError::NotFound(m),
            EngineError::OpenPr(pr) => ApiError::OpenPrConflict(pr_conflict_body(pr)),
            EngineError::Conflict(m) => ApiError::Conflict(m),
            EngineError::BadGateway(m) => ApiError::BadGateway(m),
            EngineError::ServiceUnavailable(m) => ApiError::ServiceUnavailable(m),
            EngineError::Internal(m) => ApiError::Internal(m),
        }
    }
}

fn pr_conflict_body(pr: OpenPrConflict) -> PrConflictBody {
    PrConflictBody {
        error: "an open pull request already exists for this workflow".to_string(),
        pr_number: pr.number,
        pr_url: pr.url,
        pr_state: pr.state,
        pr_branch: pr.branch,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized" })),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!({ "error": m })),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
            ApiError::OpenPrConflict(pr) => (
                StatusCode::CONFLICT,
                serde_json::to_value(pr).unwrap_or_else(|_| json!({ "error": "conflict" })),
            ),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, json!({ "error": m })),
            ApiError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": m })),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": m })),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
