//! Admin console handlers: session, users, loyalty tools, compliance trigger.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use canopy_core::{
    normalize_email, AdminRole, AdminUser, AdminUserId, LoyaltyAccount, LoyaltyTransaction,
    UserId,
};
use canopy_store::StoreError;

use super::{page_limit, query_or_invalid, ApiResponse};
use crate::auth::{
    clear_session_cookies, issue_admin_session, session_cookies, AdminKey, AdminSession,
};
use crate::compliance_job::ComplianceRunReport;
use crate::error::{ApiError, ValidationIssue};
use crate::extract::{require_non_empty, Validate, ValidatedJson};
use crate::loyalty::{TransactionPage, MAX_PAGE_SIZE};
use crate::state::AppState;

// ============================================================================
// Session
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Admin email.
    pub email: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if !self.email.contains('@') {
            issues.push(ValidationIssue::new("email", "must be an email address"));
        }
        issues
    }
}

/// Login response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// The signed-in user.
    pub user: AdminUser,
    /// Token to send as `x-csrf-token` on mutating requests.
    pub csrf_token: String,
}

/// Open a session.
///
/// The first login against an empty console creates the owner; after that
/// only invited or active emails may sign in.
pub async fn login(
    State(state): State<Arc<AppState>>,
    _key: AdminKey,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&body.email);

    let user = if state.store.list_admin_users()?.is_empty() {
        let owner = AdminUser::bootstrap_owner(&email);
        state.store.put_admin_user(&owner)?;
        tracing::info!(admin_id = %owner.id, email = %owner.email, "Bootstrap owner created");
        owner
    } else {
        let mut user = state
            .store
            .find_admin_user_by_email(&email)?
            .ok_or_else(|| {
                tracing::info!(email = %email, "Login refused for uninvited email");
                ApiError::Unauthorized
            })?;
        user.record_login();
        // A revoke between the lookup and this write surfaces as NotFound.
        state.store.update_admin_user(&user).map_err(|e| match e {
            StoreError::NotFound { .. } => ApiError::Unauthorized,
            other => other.into(),
        })?;
        user
    };

    let session = issue_admin_session(
        &user,
        &state.config.jwt_secret,
        state.config.admin_session_ttl_seconds,
    )?;
    tracing::info!(admin_id = %user.id, role = user.role.as_str(), "Admin session opened");

    let cookies = session_cookies(&session, state.config.admin_cookie_secure);
    let body = ApiResponse::new(SessionResponse {
        user,
        csrf_token: session.csrf_token,
    });
    with_cookies(Json(body).into_response(), &cookies)
}

/// Close the session by clearing its cookies.
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let cookies = clear_session_cookies(state.config.admin_cookie_secure);
    let body = ApiResponse::new(serde_json::json!({ "loggedOut": true }));
    with_cookies(Json(body).into_response(), &cookies)
}

fn with_cookies(mut response: Response, cookies: &[String]) -> Result<Response, ApiError> {
    for cookie in cookies {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {e}")))?;
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

/// The signed-in user.
pub async fn me(session: AdminSession) -> Json<ApiResponse<AdminUser>> {
    Json(ApiResponse::new(session.user))
}

// ============================================================================
// Users
// ============================================================================

/// All admin users, oldest first.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Result<Json<ApiResponse<Vec<AdminUser>>>, ApiError> {
    session.require(AdminRole::Admin)?;
    Ok(Json(ApiResponse::new(state.store.list_admin_users()?)))
}

/// Invitation request.
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    /// Invitee email.
    pub email: String,
    /// Role to grant.
    pub role: AdminRole,
}

impl Validate for InviteRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if !self.email.contains('@') {
            issues.push(ValidationIssue::new("email", "must be an email address"));
        }
        issues
    }
}

/// Invite a new admin user.
pub async fn invite_user(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    ValidatedJson(body): ValidatedJson<InviteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdminUser>>), ApiError> {
    session.require(AdminRole::Admin)?;
    ensure_grantable(&session, body.role)?;

    let email = normalize_email(&body.email);
    if state.store.find_admin_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict(format!("{email} already has access")));
    }

    let user = AdminUser::invite(&email, body.role, session.user.id);
    state.store.put_admin_user(&user)?;

    tracing::info!(
        admin_id = %session.user.id,
        invitee = %user.email,
        role = user.role.as_str(),
        "Admin user invited"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::new(user))))
}

/// Role change request.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    /// New role.
    pub role: AdminRole,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        Vec::new()
    }
}

/// Change another user's role.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<AdminUser>>, ApiError> {
    session.require(AdminRole::Admin)?;
    let mut user = load_other_user(&state, &session, &id)?;
    ensure_grantable(&session, user.role)?;
    ensure_grantable(&session, body.role)?;

    let previous = user.role;
    user.role = body.role;
    user.updated_at = chrono::Utc::now();
    state.store.update_admin_user(&user)?;

    tracing::info!(
        admin_id = %session.user.id,
        target_id = %user.id,
        from = previous.as_str(),
        to = user.role.as_str(),
        "Admin role changed"
    );

    Ok(Json(ApiResponse::new(user)))
}

/// Revoke another user's access.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    session.require(AdminRole::Admin)?;
    let user = load_other_user(&state, &session, &id)?;
    ensure_grantable(&session, user.role)?;

    state.store.delete_admin_user(&user.id)?;
    tracing::info!(admin_id = %session.user.id, target_id = %user.id, "Admin access revoked");

    Ok(StatusCode::NO_CONTENT)
}

fn load_other_user(
    state: &AppState,
    session: &AdminSession,
    id: &str,
) -> Result<AdminUser, ApiError> {
    let admin_id = id
        .parse::<AdminUserId>()
        .map_err(|_| ApiError::invalid("id", "must be a UUID"))?;
    if admin_id == session.user.id {
        return Err(ApiError::Conflict("cannot change your own access".into()));
    }
    state
        .store
        .get_admin_user(&admin_id)?
        .ok_or_else(|| ApiError::NotFound(format!("admin user {admin_id}")))
}

/// Nobody grants or manages a role above their own.
fn ensure_grantable(session: &AdminSession, role: AdminRole) -> Result<(), ApiError> {
    if session.user.role.satisfies(role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "cannot manage {} users",
            role.as_str()
        )))
    }
}

// ============================================================================
// Loyalty tools
// ============================================================================

/// Account lookup response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    /// Account (zero balance if the user never earned).
    pub account: LoyaltyAccount,
    /// Ledger page.
    pub transactions: TransactionPage,
}

/// Ledger paging for the account view.
#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    /// Page size (1 to 100).
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

/// A shopper's account and recent ledger.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    Path(user_id): Path<String>,
    query: Result<Query<AccountQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<AccountDetail>>, ApiError> {
    session.require(AdminRole::Viewer)?;
    let query = query_or_invalid(query)?;
    let user_id = user_id
        .parse::<UserId>()
        .map_err(|_| ApiError::invalid("userId", "must be a UUID"))?;
    let limit = page_limit(query.limit, MAX_PAGE_SIZE)?;

    let account = state.loyalty.account(&user_id).await?;
    let transactions = state
        .loyalty
        .transactions(&user_id, limit, query.offset.unwrap_or(0))?;

    Ok(Json(ApiResponse::new(AccountDetail {
        account,
        transactions,
    })))
}

/// Largest correction a single adjustment may apply, in either direction.
pub const MAX_ADJUSTMENT_POINTS: u64 = 1_000_000_000;

/// Manual adjustment request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    /// Shopper to adjust.
    pub user_id: UserId,
    /// Signed points.
    pub points: i64,
    /// Audit reason.
    pub reason: String,
}

impl Validate for AdjustmentRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.points == 0 {
            issues.push(ValidationIssue::new("points", "must not be zero"));
        } else if self.points.unsigned_abs() > MAX_ADJUSTMENT_POINTS {
            issues.push(ValidationIssue::new(
                "points",
                format!("must be between -{MAX_ADJUSTMENT_POINTS} and {MAX_ADJUSTMENT_POINTS}"),
            ));
        }
        require_non_empty(&mut issues, "reason", &self.reason);
        issues
    }
}

/// Credit or debit points by hand.
pub async fn create_adjustment(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    ValidatedJson(body): ValidatedJson<AdjustmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoyaltyTransaction>>), ApiError> {
    session.require(AdminRole::Editor)?;
    let tx = state
        .loyalty
        .adjust(
            body.user_id,
            body.points,
            body.reason,
            &session.user.id.to_string(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(tx))))
}

/// Cache invalidation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateRequest {
    /// Drop only this shopper's balance; omit to drop every cached program.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl Validate for InvalidateRequest {
    fn validate(&self) -> Vec<ValidationIssue> {
        Vec::new()
    }
}

/// What was invalidated.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    /// `configs` or `balance`.
    pub target: &'static str,
    /// Local entries removed (configs only).
    pub removed: usize,
}

/// Drop cached loyalty data.
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
    ValidatedJson(body): ValidatedJson<InvalidateRequest>,
) -> Result<Json<ApiResponse<InvalidateResponse>>, ApiError> {
    session.require(AdminRole::Editor)?;

    let response = if let Some(user_id) = body.user_id {
        state.loyalty.invalidate_balance(&user_id).await;
        InvalidateResponse {
            target: "balance",
            removed: 1,
        }
    } else {
        let removed = state.loyalty.invalidate_configs().await;
        InvalidateResponse {
            target: "configs",
            removed,
        }
    };

    tracing::info!(
        admin_id = %session.user.id,
        target = response.target,
        removed = response.removed,
        "Loyalty cache invalidated"
    );

    Ok(Json(ApiResponse::new(response)))
}

// ============================================================================
// Compliance
// ============================================================================

/// Run the compliance snapshot job now.
pub async fn run_compliance(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Result<Json<ApiResponse<ComplianceRunReport>>, ApiError> {
    session.require(AdminRole::Admin)?;
    tracing::info!(admin_id = %session.user.id, "Compliance run requested");
    let report = state.compliance.run_once().await?;
    Ok(Json(ApiResponse::new(report)))
}
