//! Validating JSON extractor.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ValidationIssue};

/// Request bodies with field-level checks beyond what serde enforces.
pub trait Validate {
    /// Every problem found; empty when the value is acceptable.
    fn validate(&self) -> Vec<ValidationIssue>;
}

/// JSON body that is deserialized and then validated.
///
/// Both parse failures and [`Validate`] issues become a 400
/// `VALIDATION_ERROR`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::invalid("body", rejection.body_text()))?;

        let issues = value.validate();
        if issues.is_empty() {
            Ok(Self(value))
        } else {
            Err(ApiError::Validation(issues))
        }
    }
}

/// Push an issue when `value` is blank.
pub fn require_non_empty(issues: &mut Vec<ValidationIssue>, path: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(path, "must not be empty"));
    }
}
