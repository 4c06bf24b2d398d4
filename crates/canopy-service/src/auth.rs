//! Authentication extractors and admin session cookies.
//!
//! This module provides extractors for:
//! - `AuthUser` - Shopper authentication via HS256 bearer JWT
//! - `ServiceAuth` - Service-to-service authentication via API key
//! - `AdminKey` - Bootstrap key required to open an admin session
//! - `AdminSession` - Admin console session cookie with CSRF check

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use canopy_core::{AdminRole, AdminStatus, AdminUser, AdminUserId, UserId};

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Session cookie holding the signed admin JWT.
pub const SESSION_COOKIE: &str = "admin_session";

/// Cookie echoing the CSRF token to the console script.
pub const CSRF_COOKIE: &str = "admin_csrf";

/// Header the console must send on mutating requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Audience stamped on admin session tokens.
const ADMIN_AUDIENCE: &str = "canopy-admin";

// ============================================================================
// Shopper JWT
// ============================================================================

/// Claims accepted on shopper tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time.
    pub exp: i64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience (string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

/// An authenticated shopper extracted from a bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = validate_consumer_token(
            token,
            &state.config.jwt_secret,
            state.config.jwt_issuer.as_deref(),
        )?;

        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser { user_id })
    }
}

/// Validate a shopper token.
///
/// Admin session tokens are signed with the same secret and are refused here.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for any signature, expiry, issuer or
/// audience problem.
pub fn validate_consumer_token(
    token: &str,
    secret: &str,
    issuer: Option<&str>,
) -> Result<ConsumerClaims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    let claims = decode::<ConsumerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Consumer JWT validation failed");
        ApiError::Unauthorized
    })?
    .claims;

    if audience_contains(claims.aud.as_ref(), ADMIN_AUDIENCE) {
        return Err(ApiError::Unauthorized);
    }

    Ok(claims)
}

fn audience_contains(aud: Option<&serde_json::Value>, wanted: &str) -> bool {
    match aud {
        Some(serde_json::Value::String(s)) => s == wanted,
        Some(serde_json::Value::Array(items)) => items.iter().any(|v| v == wanted),
        _ => false,
    }
}

// ============================================================================
// Service and bootstrap keys
// ============================================================================

/// Service authentication via API key.
///
/// Used by order and quiz backends posting accrual events.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_key(
            &parts.headers,
            "x-api-key",
            state.config.service_api_key.as_deref(),
        )?;

        let service_name = parts
            .headers
            .get("x-service-name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(ServiceAuth { service_name })
    }
}

/// Proof that the caller holds the admin bootstrap key.
///
/// Only the login endpoint asks for it; everything else uses the session.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_key(
            &parts.headers,
            "x-admin-key",
            state.config.admin_api_key.as_deref(),
        )?;
        Ok(AdminKey)
    }
}

/// An unset key rejects every request.
fn require_key(headers: &HeaderMap, header: &str, expected: Option<&str>) -> Result<(), ApiError> {
    let provided = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let expected = expected.ok_or(ApiError::Unauthorized)?;

    if constant_time_eq(provided, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

// ============================================================================
// Admin session
// ============================================================================

/// Claims inside the `admin_session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Admin user id.
    pub sub: String,
    /// Role at issue time (informational; the stored role is authoritative).
    pub role: AdminRole,
    /// CSRF token bound to this session.
    pub csrf: String,
    /// Audience.
    pub aud: String,
    /// Issued at.
    pub iat: i64,
    /// Expiration time.
    pub exp: i64,
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Signed session token.
    pub token: String,
    /// CSRF token the console must echo.
    pub csrf_token: String,
    /// Lifetime in seconds.
    pub max_age: u64,
}

/// Sign a session for `user`.
///
/// # Errors
///
/// Returns `ApiError::Internal` if signing fails.
pub fn issue_admin_session(
    user: &AdminUser,
    secret: &str,
    ttl_seconds: u64,
) -> Result<IssuedSession, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let csrf_token = uuid::Uuid::new_v4().simple().to_string();
    let claims = AdminClaims {
        sub: user.id.to_string(),
        role: user.role,
        csrf: csrf_token.clone(),
        aud: ADMIN_AUDIENCE.into(),
        iat: now,
        exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("session signing failed: {e}")))?;

    Ok(IssuedSession {
        token,
        csrf_token,
        max_age: ttl_seconds,
    })
}

/// `Set-Cookie` values for a new session (session, then CSRF).
#[must_use]
pub fn session_cookies(session: &IssuedSession, secure: bool) -> [String; 2] {
    [
        cookie(SESSION_COOKIE, &session.token, session.max_age, true, secure),
        cookie(CSRF_COOKIE, &session.csrf_token, session.max_age, false, secure),
    ]
}

/// `Set-Cookie` values that clear both cookies.
#[must_use]
pub fn clear_session_cookies(secure: bool) -> [String; 2] {
    [
        cookie(SESSION_COOKIE, "", 0, true, secure),
        cookie(CSRF_COOKIE, "", 0, false, secure),
    ]
}

fn cookie(name: &str, value: &str, max_age: u64, http_only: bool, secure: bool) -> String {
    let mut out = format!("{name}={value}; Path=/; Max-Age={max_age}; SameSite=Strict");
    if http_only {
        out.push_str("; HttpOnly");
    }
    if secure {
        out.push_str("; Secure");
    }
    out
}

/// Value of cookie `name` across all `Cookie` headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// An authenticated admin console user.
///
/// The user is reloaded from the store on every request, so revocation and
/// role changes take effect immediately.
#[derive(Debug, Clone)]
pub struct AdminSession {
    /// The signed-in user as currently stored.
    pub user: AdminUser,
}

impl AdminSession {
    /// Fail with 403 unless the user's role grants `required`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Forbidden` when the role is too low.
    pub fn require(&self, required: AdminRole) -> Result<(), ApiError> {
        if self.user.role.satisfies(required) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "requires {} role",
                required.as_str()
            )))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
        let claims = validate_admin_token(&token, &state.config.jwt_secret)?;

        if is_mutating(&parts.method) {
            let header = parts
                .headers
                .get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ApiError::Forbidden("missing CSRF token".into()))?;
            let cookie = read_cookie(&parts.headers, CSRF_COOKIE)
                .ok_or_else(|| ApiError::Forbidden("missing CSRF cookie".into()))?;

            if !constant_time_eq(header, &cookie) || !constant_time_eq(header, &claims.csrf) {
                return Err(ApiError::Forbidden("CSRF token mismatch".into()));
            }
        }

        let admin_id = claims
            .sub
            .parse::<AdminUserId>()
            .map_err(|_| ApiError::Unauthorized)?;
        let user = state
            .store
            .get_admin_user(&admin_id)?
            .filter(|u| u.status == AdminStatus::Active)
            .ok_or_else(|| {
                tracing::info!(admin_id = %admin_id, "Session for removed admin rejected");
                ApiError::Unauthorized
            })?;

        Ok(AdminSession { user })
    }
}

fn validate_admin_token(token: &str, secret: &str) -> Result<AdminClaims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[ADMIN_AUDIENCE]);

    decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Admin session validation failed");
        ApiError::Unauthorized
    })
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
