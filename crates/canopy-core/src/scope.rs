//! Tenant scoping.

use serde::{Deserialize, Serialize};

/// The organization / brand / store a request is evaluated in.
///
/// Any level may be absent; an empty scope addresses organization-agnostic
/// (global) configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    /// Organization document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Brand document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,

    /// Store document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

impl TenantScope {
    /// Scope limited to an organization.
    #[must_use]
    pub fn organization(id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Narrow the scope to a brand.
    #[must_use]
    pub fn with_brand(mut self, id: impl Into<String>) -> Self {
        self.brand_id = Some(id.into());
        self
    }

    /// Narrow the scope to a store.
    #[must_use]
    pub fn with_store(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    /// Colon-joined key segment (`org:brand:store`, `-` for absent levels).
    #[must_use]
    pub fn cache_segment(&self) -> String {
        let part = |v: &Option<String>| v.as_deref().unwrap_or("-").to_string();
        format!(
            "{}:{}:{}",
            part(&self.organization_id),
            part(&self.brand_id),
            part(&self.store_id)
        )
    }

    /// Whether content authored for `self` applies to a request in `request`.
    ///
    /// Each level `self` defines must equal the request's; undefined levels
    /// match anything.
    #[must_use]
    pub fn covers(&self, request: &TenantScope) -> bool {
        let level = |own: &Option<String>, req: &Option<String>| own.is_none() || own == req;
        level(&self.organization_id, &request.organization_id)
            && level(&self.brand_id, &request.brand_id)
            && level(&self.store_id, &request.store_id)
    }

    /// Number of defined levels; more specific content wins.
    #[must_use]
    pub fn specificity(&self) -> usize {
        [&self.organization_id, &self.brand_id, &self.store_id]
            .iter()
            .filter(|level| level.is_some())
            .count()
    }
}
