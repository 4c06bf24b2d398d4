//! Shopper-facing loyalty handlers and the service accrual endpoint.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use canopy_core::{LoyaltyEvent, LoyaltyTransaction, TenantScope, UserId};

use super::{page_limit, query_or_invalid, ApiResponse};
use crate::auth::{AuthUser, ServiceAuth};
use crate::error::{ApiError, ValidationIssue};
use crate::extract::{require_non_empty, Validate, ValidatedJson};
use crate::loyalty::{AccrualOutcome, LoyaltyStatus, TransactionPage};
use crate::state::AppState;

/// Page size when the caller does not ask for one.
const DEFAULT_PAGE_SIZE: usize = 20;

/// Current balance, tier and rewards for the caller.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<ApiResponse<LoyaltyStatus>>, ApiError> {
    let scope = query_or_invalid(scope)?;
    let status = state.loyalty.status(auth.user_id, &scope).await?;
    Ok(Json(ApiResponse::new(status)))
}

/// Transaction list query.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Page size (1 to 100).
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

/// The caller's ledger, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<TransactionPage>>, ApiError> {
    let query = query_or_invalid(query)?;
    let limit = page_limit(query.limit, DEFAULT_PAGE_SIZE)?;

    let page = state
        .loyalty
        .transactions(&auth.user_id, limit, query.offset.unwrap_or(0))?;
    Ok(Json(ApiResponse::new(page)))
}

/// Redemption request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    /// Tenant the reward belongs to.
    #[serde(flatten)]
    pub scope: TenantScope,
    /// Reward to redeem.
    pub reward_id: String,
    /// Terms version the shopper accepted.
    #[serde(default)]
    pub accepted_terms_version: Option<String>,
}

impl Validate for RedeemRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        require_non_empty(&mut issues, "rewardId", &self.reward_id);
        issues
    }
}

/// Spend points on a reward.
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidatedJson(body): ValidatedJson<RedeemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoyaltyTransaction>>), ApiError> {
    let tx = state
        .loyalty
        .redeem(
            auth.user_id,
            body.scope,
            &body.reward_id,
            body.accepted_terms_version.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(tx))))
}

/// Quiz completion request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompletionRequest {
    /// Tenant the quiz was taken in.
    #[serde(flatten)]
    pub scope: TenantScope,
    /// Quiz document id.
    pub quiz_id: String,
}

impl Validate for QuizCompletionRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        require_non_empty(&mut issues, "quizId", &self.quiz_id);
        issues
    }
}

/// Award quiz points (once per quiz).
pub async fn complete_quiz(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidatedJson(body): ValidatedJson<QuizCompletionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccrualOutcome>>), ApiError> {
    let outcome = state
        .loyalty
        .complete_quiz(auth.user_id, body.scope, &body.quiz_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(outcome))))
}

/// Order accrual event posted by the commerce backend.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualRequest {
    /// Idempotency key, unique per order.
    pub event_id: String,
    /// Shopper to credit.
    pub user_id: UserId,
    /// Tenant the order was placed in.
    #[serde(flatten)]
    pub scope: TenantScope,
    /// Order total in cents.
    pub order_total_cents: i64,
    /// One entry per purchased unit.
    #[serde(default)]
    pub product_ids: Vec<String>,
}

impl Validate for AccrualRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        require_non_empty(&mut issues, "eventId", &self.event_id);
        if self.order_total_cents < 0 {
            issues.push(ValidationIssue::new("orderTotalCents", "must not be negative"));
        }
        issues
    }
}

/// Record an order and award points.
pub async fn record_accrual(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    ValidatedJson(body): ValidatedJson<AccrualRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccrualOutcome>>), ApiError> {
    tracing::debug!(
        service = %service.service_name,
        event_id = %body.event_id,
        "Accrual event received"
    );

    let event = LoyaltyEvent::Order {
        order_total_cents: body.order_total_cents,
        product_ids: body.product_ids,
    };
    let outcome = state
        .loyalty
        .accrue(body.user_id, body.scope, &event, &body.event_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(outcome))))
}
