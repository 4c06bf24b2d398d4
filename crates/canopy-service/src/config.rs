//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Default signing secret for local development only.
const DEV_JWT_SECRET: &str = "canopy-dev-secret";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/canopy").
    pub data_dir: String,

    /// HS256 secret for consumer bearer tokens and admin session cookies.
    pub jwt_secret: String,

    /// Expected `iss` claim on consumer tokens (optional).
    pub jwt_issuer: Option<String>,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Bootstrap key required to open an admin session.
    pub admin_api_key: Option<String>,

    /// Admin session lifetime in seconds.
    pub admin_session_ttl_seconds: u64,

    /// Whether admin cookies carry the `Secure` attribute.
    pub admin_cookie_secure: bool,

    /// Sanity CMS connection.
    pub sanity: SanityConfig,

    /// Shared secret for Sanity webhook signatures (optional).
    pub sanity_webhook_secret: Option<String>,

    /// JSON file served as CMS content when Sanity is not configured.
    pub content_fixture_path: Option<String>,

    /// Redis URL for the shared cache tier (optional).
    pub redis_url: Option<String>,

    /// Cache entry lifetime in seconds.
    pub cache_ttl_seconds: u64,

    /// Compliance snapshot interval in seconds; 0 disables the timer.
    pub compliance_interval_seconds: u64,

    /// Sentry DSN for 5xx reporting (optional).
    pub sentry_dsn: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Sanity project settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityConfig {
    /// Project id; `None` leaves the CMS unconfigured.
    pub project_id: Option<String>,
    /// Dataset name (default: "production").
    pub dataset: String,
    /// Dated API version (default: "2024-01-01").
    pub api_version: String,
    /// API token with read/write access.
    pub token: Option<String>,
    /// Full API base URL, overriding the one derived from the project id.
    pub api_url: Option<String>,
}

impl SanityConfig {
    /// Whether enough is set to talk to Sanity.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.project_id.is_some() || self.api_url.is_some()
    }

    /// API base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.api_url
            .as_ref()
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| {
                self.project_id
                    .as_ref()
                    .map(|id| format!("https://{id}.api.sanity.io"))
            })
    }
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset: "production".into(),
            api_version: "2024-01-01".into(),
            token: None,
            api_url: None,
        }
    }
}

/// Sanity secrets file structure.
#[derive(Debug, Deserialize)]
struct SanitySecrets {
    project_id: String,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (sanity, sanity_webhook_secret) = load_sanity_secrets();

        let jwt_secret = env_opt("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set - using the development secret");
            DEV_JWT_SECRET.into()
        });

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            jwt_secret,
            jwt_issuer: env_opt("JWT_ISSUER"),
            service_api_key: env_opt("SERVICE_API_KEY"),
            admin_api_key: env_opt("ADMIN_API_KEY"),
            admin_session_ttl_seconds: env_parse(
                "ADMIN_SESSION_TTL_SECONDS",
                defaults.admin_session_ttl_seconds,
            ),
            admin_cookie_secure: env_parse("ADMIN_COOKIE_SECURE", defaults.admin_cookie_secure),
            sanity,
            sanity_webhook_secret,
            content_fixture_path: env_opt("CONTENT_FIXTURE_PATH"),
            redis_url: env_opt("REDIS_URL"),
            cache_ttl_seconds: env_parse("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            compliance_interval_seconds: env_parse(
                "COMPLIANCE_INTERVAL_SECONDS",
                defaults.compliance_interval_seconds,
            ),
            sentry_dsn: env_opt("SENTRY_DSN"),
            cors_origins: env_or("CORS_ORIGINS", "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: String) -> String {
    env_opt(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load Sanity settings from the secrets file, falling back to environment.
fn load_sanity_secrets() -> (SanityConfig, Option<String>) {
    let defaults = SanityConfig::default();
    let api_version = env_or("SANITY_API_VERSION", defaults.api_version.clone());
    let api_url = env_opt("SANITY_API_URL");

    let secret_paths = [".secrets/sanity.json", "../.secrets/sanity.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<SanitySecrets>(path) {
            tracing::info!(path = %path, "Loaded Sanity secrets from file");
            let config = SanityConfig {
                project_id: Some(secrets.project_id),
                dataset: secrets.dataset.unwrap_or(defaults.dataset),
                api_version,
                token: secrets.token,
                api_url,
            };
            return (
                config,
                secrets
                    .webhook_secret
                    .or_else(|| env_opt("SANITY_WEBHOOK_SECRET")),
            );
        }
    }

    tracing::debug!("Sanity secrets file not found, using environment variables");
    (
        SanityConfig {
            project_id: env_opt("SANITY_PROJECT_ID"),
            dataset: env_or("SANITY_DATASET", defaults.dataset),
            api_version,
            token: env_opt("SANITY_API_TOKEN"),
            api_url,
        },
        env_opt("SANITY_WEBHOOK_SECRET"),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/canopy".into(),
            jwt_secret: DEV_JWT_SECRET.into(),
            jwt_issuer: None,
            service_api_key: None,
            admin_api_key: None,
            admin_session_ttl_seconds: 8 * 60 * 60,
            admin_cookie_secure: true,
            sanity: SanityConfig::default(),
            sanity_webhook_secret: None,
            content_fixture_path: None,
            redis_url: None,
            cache_ttl_seconds: 300,
            compliance_interval_seconds: 3600,
            sentry_dsn: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanity_base_url_prefers_override() {
        let mut sanity = SanityConfig {
            project_id: Some("abc123".into()),
            ..SanityConfig::default()
        };
        assert_eq!(
            sanity.base_url().as_deref(),
            Some("https://abc123.api.sanity.io")
        );

        sanity.api_url = Some("http://127.0.0.1:9999/".into());
        assert_eq!(sanity.base_url().as_deref(), Some("http://127.0.0.1:9999"));
    }

    #[test]
    fn unconfigured_sanity_has_no_base_url() {
        let sanity = SanityConfig::default();
        assert!(!sanity.is_configured());
        assert!(sanity.base_url().is_none());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.compliance_interval_seconds, 3600);
        assert_eq!(config.sanity.dataset, "production");
    }
}
