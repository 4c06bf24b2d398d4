//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn;
use axum::routing::{get, patch, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::{error_envelope, panic_response, ApiError};
use crate::handlers::{admin, health, loyalty, personalization, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the service accrual endpoint.
const ACCRUAL_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for shopper API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for the admin console.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /content/personalization` - Rank content candidates
///
/// ## Loyalty (shopper JWT auth)
/// - `GET /api/v1/loyalty/status` - Balance, tier and rewards
/// - `GET /api/v1/loyalty/transactions` - Ledger, newest first
/// - `POST /api/v1/loyalty/redeem` - Redeem a reward
/// - `POST /api/v1/loyalty/quiz-completions` - Quiz points
///
/// ## Loyalty (service API key auth, rate-limited)
/// - `POST /api/v1/loyalty/accruals` - Order accrual event
///
/// ## Admin (session cookie + CSRF)
/// - `POST|GET|DELETE /api/admin/session` - Login, current user, logout
/// - `GET /api/admin/users`, `POST /api/admin/users/invite`
/// - `PATCH|DELETE /api/admin/users/:id`
/// - `GET /api/admin/loyalty/accounts/:user_id`
/// - `POST /api/admin/loyalty/adjustments`
/// - `POST /api/admin/loyalty/cache/invalidate`
/// - `POST /api/admin/compliance/run`
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/sanity` - Sanity document changes
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Order backends post in bursts, so accruals get their own, larger limit.
    let accrual_routes = Router::new()
        .route("/", post(loyalty::record_accrual))
        .layer(ConcurrencyLimitLayer::new(ACCRUAL_MAX_CONCURRENT_REQUESTS));

    let loyalty_routes = Router::new()
        .route("/status", get(loyalty::get_status))
        .route("/transactions", get(loyalty::list_transactions))
        .route("/redeem", post(loyalty::redeem))
        .route("/quiz-completions", post(loyalty::complete_quiz))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/accruals", accrual_routes);

    let admin_routes = Router::new()
        .route(
            "/session",
            post(admin::login).get(admin::me).delete(admin::logout),
        )
        .route("/users", get(admin::list_users))
        .route("/users/invite", post(admin::invite_user))
        .route(
            "/users/:id",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/loyalty/accounts/:user_id", get(admin::get_account))
        .route("/loyalty/adjustments", post(admin::create_adjustment))
        .route("/loyalty/cache/invalidate", post(admin::invalidate_cache))
        .route("/compliance/run", post(admin::run_compliance))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/api/v1/loyalty", loyalty_routes)
        .nest("/api/admin", admin_routes)
        .route("/content/personalization", post(personalization::personalize))
        // Webhooks (no rate limit - controlled by the CMS)
        .route("/webhooks/sanity", post(webhooks::sanity_webhook))
        .fallback(not_found)
        // Global middleware (last added runs first)
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(error_envelope))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("route not found".into())
}

/// Build the CORS layer from configured origins.
///
/// Explicit origins may send the admin session cookie; `*` may not.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    }
}
