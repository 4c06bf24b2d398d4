//! Headless CMS (Sanity) access.
//!
//! The service reads loyalty programs, personalization rules and compliance
//! inputs from the CMS and writes compliance snapshots back. Everything goes
//! through the [`ContentSource`] trait:
//!
//! - [`SanityClient`]: the Sanity HTTP API, queried with GROQ
//! - [`StaticContent`]: a JSON fixture held in memory, for local development
//!   and tests

pub mod client;
pub mod fixture;
pub mod groq;
pub mod types;

pub use client::SanityClient;
pub use fixture::{ContentFixture, StaticContent};
pub use groq::{GroqQuery, QueryBuilder};
pub use types::{select_config, ScopedConfig, ScopedRule};

use async_trait::async_trait;
use canopy_core::{ComplianceInputs, LoyaltyConfig, PersonalizationRule, TenantScope};

/// Error type for CMS operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The CMS returned an error status.
    #[error("CMS API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Response or fixture could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client misconfigured or fixture unreadable.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Read/write access to CMS content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// The most specific loyalty program covering `scope`.
    ///
    /// A scope with no program gets an empty one.
    async fn loyalty_config(&self, scope: &TenantScope) -> Result<LoyaltyConfig, ContentError>;

    /// Personalization rules covering `scope`, in authoring order.
    async fn personalization_rules(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<PersonalizationRule>, ContentError>;

    /// Organizations, brands, stores, legal documents and requirements.
    async fn compliance_inputs(&self) -> Result<ComplianceInputs, ContentError>;

    /// Create or replace documents, keyed by their `_id`.
    async fn write_documents(&self, documents: Vec<serde_json::Value>) -> Result<(), ContentError>;
}
