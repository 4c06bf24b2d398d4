//! API handlers.
//!
//! Successful responses are wrapped as `{ "ok": true, "data": ... }`.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use serde::Serialize;

use crate::error::ApiError;
use crate::loyalty::MAX_PAGE_SIZE;

pub mod admin;
pub mod health;
pub mod loyalty;
pub mod personalization;
pub mod webhooks;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`.
    pub ok: bool,
    /// Payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data`.
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Turn a query-string rejection into a validation error.
pub(crate) fn query_or_invalid<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::invalid("query", rejection.body_text()))
}

/// Resolve a `limit` query parameter, rejecting values outside `1..=MAX_PAGE_SIZE`.
pub(crate) fn page_limit(limit: Option<usize>, default: usize) -> Result<usize, ApiError> {
    match limit.unwrap_or(default) {
        limit @ 1..=MAX_PAGE_SIZE => Ok(limit),
        _ => Err(ApiError::invalid(
            "limit",
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        )),
    }
}
