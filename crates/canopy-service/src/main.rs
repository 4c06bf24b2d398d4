//! Canopy Service - loyalty, personalization and compliance API
//!
//! This is the main entry point for the canopy service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use canopy_service::{create_router, AppState, ServiceConfig, TieredCache};
use canopy_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,canopy=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Canopy Service");

    let config = ServiceConfig::from_env();

    // Kept alive for the life of the process so events flush on exit.
    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        tracing::info!("Sentry error reporting enabled");
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        sanity_configured = %config.sanity.is_configured(),
        redis_configured = %config.redis_url.is_some(),
        compliance_interval_secs = config.compliance_interval_seconds,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    let mut cache = TieredCache::new(Duration::from_secs(config.cache_ttl_seconds));
    if let Some(url) = &config.redis_url {
        match TieredCache::connect_redis(url).await {
            Ok(conn) => cache = cache.with_redis(conn),
            Err(e) => tracing::warn!(error = %e, "Redis unavailable - using local cache only"),
        }
    }

    let state = AppState::new(store, cache, config.clone());

    if config.compliance_interval_seconds > 0 {
        state.compliance.clone().spawn();
    } else {
        tracing::info!("Compliance timer disabled");
    }

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(canopy_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("Built without rocksdb-backend - ledger is in memory only");
    Ok(Arc::new(canopy_store::MemoryStore::new()))
}
