//! Common test utilities for canopy integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestResponse, TestServer};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use canopy_core::{
    LoyaltyConfig, LoyaltyReward, LoyaltyRule, LoyaltyTier, RuleKind, TenantScope, UserId,
};
use canopy_service::cms::ScopedConfig;
use canopy_service::{
    create_router, AppState, ContentFixture, ServiceConfig, StaticContent, TieredCache,
};
use canopy_store::MemoryStore;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for assertions.
    pub store: Arc<MemoryStore>,
    /// Backing content, for assertions on written documents.
    pub content: Arc<StaticContent>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

/// Cookie and CSRF headers of a signed-in admin.
#[derive(Debug, Clone)]
pub struct AdminHeaders {
    pub cookie: HeaderValue,
    pub csrf: HeaderValue,
    pub user_id: String,
}

impl TestHarness {
    /// Harness with the default loyalty program.
    pub fn new() -> Self {
        Self::with_fixture(ContentFixture {
            loyalty_configs: vec![ScopedConfig {
                scope: TenantScope::default(),
                config: default_program(),
            }],
            ..ContentFixture::default()
        })
    }

    /// Harness serving `fixture` as CMS content.
    pub fn with_fixture(fixture: ContentFixture) -> Self {
        let store = Arc::new(MemoryStore::new());
        let content = Arc::new(StaticContent::new(fixture));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: JWT_SECRET.into(),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            admin_cookie_secure: false,
            sanity_webhook_secret: Some(WEBHOOK_SECRET.into()),
            compliance_interval_seconds: 0,
            ..ServiceConfig::default()
        };

        let state = AppState::with_content(
            store.clone(),
            content.clone(),
            TieredCache::new(Duration::from_secs(60)),
            config,
        );
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            content,
            test_user_id: UserId::generate(),
        }
    }

    /// Bearer header for the test user.
    pub fn user_auth(&self) -> (HeaderName, HeaderValue) {
        bearer(&self.test_user_id)
    }

    /// Service API key header.
    pub fn service_auth() -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static(SERVICE_API_KEY),
        )
    }

    /// Post an order accrual as the commerce backend.
    pub async fn accrue(&self, user_id: &UserId, event_id: &str, total_cents: i64) -> TestResponse {
        let (name, value) = Self::service_auth();
        self.server
            .post("/api/v1/loyalty/accruals")
            .add_header(name, value)
            .json(&serde_json::json!({
                "eventId": event_id,
                "userId": user_id.to_string(),
                "orderTotalCents": total_cents,
            }))
            .await
    }

    /// Open an admin session for `email`.
    pub async fn admin_login(&self, email: &str) -> AdminHeaders {
        let response = self
            .server
            .post("/api/admin/session")
            .add_header(
                HeaderName::from_static("x-admin-key"),
                HeaderValue::from_static(ADMIN_API_KEY),
            )
            .json(&serde_json::json!({ "email": email }))
            .await;
        response.assert_status_ok();

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect::<Vec<_>>()
            .join("; ");

        let body: serde_json::Value = response.json();
        let csrf = body["data"]["csrfToken"].as_str().unwrap().to_string();
        let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();

        AdminHeaders {
            cookie: HeaderValue::from_str(&cookie).unwrap(),
            csrf: HeaderValue::from_str(&csrf).unwrap(),
            user_id,
        }
    }

    /// Request carrying an admin's cookie and CSRF header.
    pub fn admin(&self, request: TestRequest, admin: &AdminHeaders) -> TestRequest {
        request
            .add_header(COOKIE, admin.cookie.clone())
            .add_header(HeaderName::from_static("x-csrf-token"), admin.csrf.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bearer header for any user.
pub fn bearer(user_id: &UserId) -> (HeaderName, HeaderValue) {
    let value = format!("Bearer {}", user_token(user_id));
    (AUTHORIZATION, HeaderValue::from_str(&value).unwrap())
}

/// A valid shopper JWT.
pub fn user_token(user_id: &UserId) -> String {
    let claims = serde_json::json!({
        "sub": user_id.to_string(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Bronze/gold tiers, a dollar rule, a quiz rule and two rewards.
pub fn default_program() -> LoyaltyConfig {
    LoyaltyConfig {
        tiers: vec![
            LoyaltyTier {
                id: "bronze".into(),
                name: "Bronze".into(),
                min_points: 0,
                multiplier: 1.0,
                perks: vec![],
            },
            LoyaltyTier {
                id: "gold".into(),
                name: "Gold".into(),
                min_points: 500,
                multiplier: 1.5,
                perks: vec![],
            },
        ],
        rules: vec![
            LoyaltyRule {
                id: "per-dollar".into(),
                name: "1 point per dollar".into(),
                active: true,
                kind: RuleKind::Dollar {
                    points_per_dollar: 1.0,
                },
            },
            LoyaltyRule {
                id: "any-quiz".into(),
                name: "Quiz bonus".into(),
                active: true,
                kind: RuleKind::Quiz {
                    quiz_id: None,
                    points: 25,
                },
            },
        ],
        rewards: vec![
            LoyaltyReward {
                id: "pre-roll".into(),
                name: "Free pre-roll".into(),
                cost_points: 100,
                min_tier_id: None,
                active: true,
            },
            LoyaltyReward {
                id: "vip-tour".into(),
                name: "Grow tour".into(),
                cost_points: 50,
                min_tier_id: Some("gold".into()),
                active: true,
            },
        ],
        terms_version: None,
    }
}
