//! API error types and the response envelope.
//!
//! Every error leaves the service as
//! `{ "ok": false, "error": { "code", "message", "details"? }, "requestId" }`.
//! Handlers return [`ApiError`]; [`error_envelope`] stamps the request id
//! onto the body and forwards 5xx errors to Sentry.

use std::any::Any;

use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use canopy_core::LoyaltyError;
use canopy_store::StoreError;

use crate::cms::ContentError;
use crate::loyalty::ServiceError;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One failed validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (`body` for unparseable input).
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    /// Build an issue for `path`.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid credentials but insufficient permissions.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request input failed validation.
    #[error("validation failed ({} issues)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// Resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Event id already applied.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// Loyalty rule refusal.
    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Upstream (CMS) failure.
    #[error("external service error: {0}")]
    ExternalService(String),
}

impl ApiError {
    /// Shorthand for a single-issue validation error.
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationIssue::new(path, message)])
    }
}

/// Client-visible error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured extras (validation issues, balances, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Response extension read by [`error_envelope`].
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Body sent to the client.
    pub body: ErrorBody,
    /// Detail kept server-side (logs and Sentry only).
    pub internal: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    ok: bool,
    error: ErrorBody,
    request_id: Option<String>,
}

fn loyalty_status(err: &LoyaltyError) -> StatusCode {
    match err {
        LoyaltyError::InsufficientPoints { .. } | LoyaltyError::LegalVersionMismatch { .. } => {
            StatusCode::CONFLICT
        }
        LoyaltyError::TierNotEligible { .. } => StatusCode::FORBIDDEN,
        LoyaltyError::RewardNotFound { .. } => StatusCode::NOT_FOUND,
    }
}

fn loyalty_details(err: &LoyaltyError) -> serde_json::Value {
    match err {
        LoyaltyError::InsufficientPoints { balance, required } => {
            serde_json::json!({ "balance": balance, "required": required })
        }
        LoyaltyError::TierNotEligible {
            required_tier,
            current_tier,
        } => serde_json::json!({ "requiredTier": required_tier, "currentTier": current_tier }),
        LoyaltyError::RewardNotFound { reward_id } => serde_json::json!({ "rewardId": reward_id }),
        LoyaltyError::LegalVersionMismatch { expected, provided } => {
            serde_json::json!({ "expected": expected, "provided": provided })
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut internal = None;
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            Self::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Request validation failed".to_string(),
                Some(serde_json::json!({ "issues": issues })),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
            Self::DuplicateEvent(id) => (
                StatusCode::CONFLICT,
                "DUPLICATE_EVENT",
                format!("Event {id} already processed"),
                Some(serde_json::json!({ "eventId": id })),
            ),
            Self::Loyalty(err) => (
                loyalty_status(err),
                err.code(),
                err.to_string(),
                Some(loyalty_details(err)),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                internal = Some(msg.clone());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => {
                tracing::error!(error = %msg, "Upstream service error");
                internal = Some(msg.clone());
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Content service unavailable".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            code: code.to_string(),
            message,
            details,
        };

        let envelope = ErrorEnvelope {
            ok: false,
            error: body.clone(),
            request_id: None,
        };
        let mut response = (status, Json(envelope)).into_response();
        response
            .extensions_mut()
            .insert(ErrorReport { body, internal });
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientPoints { balance, required } => {
                Self::Loyalty(LoyaltyError::InsufficientPoints { balance, required })
            }
            StoreError::DuplicateEvent { event_id } => Self::DuplicateEvent(event_id),
            err @ StoreError::BalanceOverflow { .. } => Self::Conflict(err.to_string()),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        Self::ExternalService(err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Loyalty(e) => Self::Loyalty(e),
            ServiceError::Store(e) => e.into(),
            ServiceError::Content(e) => e.into(),
        }
    }
}

/// Middleware that finishes error responses.
///
/// Adds the `x-request-id` value to the envelope and reports 5xx errors to
/// Sentry (a no-op when Sentry is not initialized).
pub async fn error_envelope(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let route = format!("{} {}", request.method(), request.uri().path());

    let mut response = next.run(request).await;
    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };

    let status = response.status();
    if status.is_server_error() {
        let detail = report.internal.as_deref().unwrap_or(&report.body.message);
        sentry::capture_message(
            &format!("{route} -> {status}: {detail}"),
            sentry::Level::Error,
        );
    }

    let envelope = ErrorEnvelope {
        ok: false,
        error: report.body,
        request_id,
    };
    let mut rebuilt = (status, Json(envelope)).into_response();
    for (name, value) in response.headers() {
        if name != CONTENT_LENGTH && name != CONTENT_TYPE {
            rebuilt.headers_mut().append(name.clone(), value.clone());
        }
    }
    rebuilt
}

/// Turn a handler panic into an internal error so `error_envelope` wraps it.
#[allow(clippy::needless_pass_by_value)]
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
