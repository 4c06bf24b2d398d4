//! Application state.

use std::sync::Arc;
use std::time::Duration;

use canopy_store::Store;

use crate::cache::TieredCache;
use crate::cms::{ContentSource, SanityClient, StaticContent};
use crate::compliance_job::ComplianceJob;
use crate::config::ServiceConfig;
use crate::loyalty::LoyaltyService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// CMS content (Sanity or a local fixture).
    pub content: Arc<dyn ContentSource>,

    /// Two-tier cache.
    pub cache: Arc<TieredCache>,

    /// Loyalty operations.
    pub loyalty: LoyaltyService,

    /// Compliance snapshot job (shared with the admin trigger).
    pub compliance: ComplianceJob,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create state with the content source chosen from configuration.
    ///
    /// Sanity is used when configured; otherwise the fixture at
    /// `content_fixture_path`, or empty content.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, cache: TieredCache, config: ServiceConfig) -> Self {
        let content = content_from_config(&config);
        Self::with_content(store, content, cache, config)
    }

    /// Create state around an explicit content source.
    #[must_use]
    pub fn with_content(
        store: Arc<dyn Store>,
        content: Arc<dyn ContentSource>,
        cache: TieredCache,
        config: ServiceConfig,
    ) -> Self {
        let cache = Arc::new(cache);
        let loyalty = LoyaltyService::new(store.clone(), content.clone(), cache.clone());
        let compliance = ComplianceJob::new(
            content.clone(),
            Duration::from_secs(config.compliance_interval_seconds),
        );

        Self {
            store,
            content,
            cache,
            loyalty,
            compliance,
            config,
        }
    }
}

fn content_from_config(config: &ServiceConfig) -> Arc<dyn ContentSource> {
    if config.sanity.is_configured() {
        match SanityClient::new(&config.sanity) {
            Ok(client) => {
                tracing::info!(dataset = %config.sanity.dataset, "Sanity integration enabled");
                return Arc::new(client);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create Sanity client");
            }
        }
    }

    if let Some(path) = &config.content_fixture_path {
        match StaticContent::from_file(path) {
            Ok(content) => {
                tracing::info!(path = %path, "Serving CMS content from fixture");
                return Arc::new(content);
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to load content fixture");
            }
        }
    }

    tracing::warn!("CMS not configured - loyalty programs and rules will be empty");
    Arc::new(StaticContent::default())
}
