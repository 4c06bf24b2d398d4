//! Content personalization handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use canopy_core::{evaluate_personalization, Candidate, ScoredCandidate, TenantScope};

use super::ApiResponse;
use crate::error::{ApiError, ValidationIssue};
use crate::extract::{Validate, ValidatedJson};
use crate::state::AppState;

/// Ranking request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationRequest {
    /// Tenant whose rules apply.
    #[serde(flatten)]
    pub scope: TenantScope,
    /// Shopper context the rule conditions read.
    #[serde(default)]
    pub context: serde_json::Value,
    /// Content to rank.
    pub candidates: Vec<Candidate>,
}

impl Validate for PersonalizationRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if !(self.context.is_null() || self.context.is_object()) {
            issues.push(ValidationIssue::new("context", "must be an object"));
        }
        for (i, candidate) in self.candidates.iter().enumerate() {
            if candidate.id.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    format!("candidates.{i}.id"),
                    "must not be empty",
                ));
            }
        }
        issues
    }
}

/// Ranked candidates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationResponse {
    /// Highest score first.
    pub results: Vec<ScoredCandidate>,
    /// Rules considered.
    pub rule_count: usize,
}

/// Rank candidates with the scope's personalization rules.
pub async fn personalize(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<PersonalizationRequest>,
) -> Result<Json<ApiResponse<PersonalizationResponse>>, ApiError> {
    let rules = state.content.personalization_rules(&body.scope).await?;
    let results = evaluate_personalization(&rules, &body.context, &body.candidates);

    tracing::debug!(
        scope = %body.scope.cache_segment(),
        rules = rules.len(),
        candidates = body.candidates.len(),
        "Personalization evaluated"
    );

    Ok(Json(ApiResponse::new(PersonalizationResponse {
        results,
        rule_count: rules.len(),
    })))
}
