//! Legal-document coverage scoring for stores, brands and organizations.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An organization (tenant root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// CMS document id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// A brand inside an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    /// CMS document id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning organization.
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// A physical dispensary location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailStore {
    /// CMS document id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning organization.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Owning brand.
    #[serde(default)]
    pub brand_id: Option<String>,
    /// Regulatory jurisdiction code, e.g. `US-CO`.
    pub jurisdiction: String,
}

/// A published legal document (terms, privacy policy, age gate, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalDocument {
    /// CMS document id.
    pub id: String,
    /// Document type key, matched against requirements.
    pub doc_type: String,
    /// Jurisdiction it applies to; `None` applies everywhere.
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Restrict to one organization.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Restrict to one brand.
    #[serde(default)]
    pub brand_id: Option<String>,
    /// Restrict to one store.
    #[serde(default)]
    pub store_id: Option<String>,
    /// Start of validity; `None` means always.
    #[serde(default)]
    pub effective_from: Option<DateTime<Utc>>,
    /// End of validity (exclusive); `None` means open-ended.
    #[serde(default)]
    pub effective_to: Option<DateTime<Utc>>,
    /// Published version label.
    #[serde(default)]
    pub version: Option<String>,
}

impl LegalDocument {
    /// Whether the document is in force at `now`.
    #[must_use]
    pub fn in_effect(&self, now: DateTime<Utc>) -> bool {
        self.effective_from.map_or(true, |from| from <= now)
            && self.effective_to.map_or(true, |to| now < to)
    }

    /// Whether the document covers a store.
    #[must_use]
    pub fn applies_to(&self, store: &RetailStore) -> bool {
        let same = |doc: &Option<String>, actual: Option<&String>| {
            doc.as_ref().map_or(true, |d| Some(d) == actual)
        };
        self.jurisdiction
            .as_ref()
            .map_or(true, |j| j.eq_ignore_ascii_case(&store.jurisdiction))
            && same(&self.organization_id, store.organization_id.as_ref())
            && same(&self.brand_id, store.brand_id.as_ref())
            && same(&self.store_id, Some(&store.id))
    }
}

/// Required document types per jurisdiction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// Used when a jurisdiction has no entry of its own.
    #[serde(default)]
    pub default_types: Vec<String>,
    /// Jurisdiction code → required types.
    #[serde(default)]
    pub by_jurisdiction: HashMap<String, Vec<String>>,
}

impl Requirements {
    /// Required types for a jurisdiction, deduplicated.
    #[must_use]
    pub fn required_for(&self, jurisdiction: &str) -> Vec<String> {
        let types = self
            .by_jurisdiction
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(jurisdiction))
            .map_or(&self.default_types, |(_, types)| types);
        let mut seen = BTreeSet::new();
        types
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }
}

/// Everything one compliance run reads from the CMS.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceInputs {
    /// All organizations.
    #[serde(default)]
    pub organizations: Vec<Organization>,
    /// All brands.
    #[serde(default)]
    pub brands: Vec<Brand>,
    /// All stores.
    #[serde(default)]
    pub stores: Vec<RetailStore>,
    /// All legal documents.
    #[serde(default)]
    pub documents: Vec<LegalDocument>,
    /// Requirement table.
    #[serde(default)]
    pub requirements: Requirements,
}

/// Coverage of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCoverage {
    /// Store id.
    pub store_id: String,
    /// Store name.
    pub store_name: String,
    /// Jurisdiction evaluated.
    pub jurisdiction: String,
    /// `round(100 * found / required)`.
    pub score: u8,
    /// Types required in the jurisdiction.
    pub required_types: Vec<String>,
    /// Required types with an in-force document.
    pub found_types: Vec<String>,
    /// Required types without one.
    pub missing_types: Vec<String>,
}

/// Aggregation level of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotScope {
    /// Per organization.
    Organization,
    /// Per brand.
    Brand,
}

impl SnapshotScope {
    /// Lowercase label used in document ids.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Brand => "brand",
        }
    }
}

/// A point-in-time compliance result for one organization or brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSnapshot {
    /// Aggregation level.
    pub scope: SnapshotScope,
    /// Organization or brand id.
    pub entity_id: String,
    /// Organization or brand name.
    pub entity_name: String,
    /// Mean store score, rounded; 0 when the entity has no stores.
    pub score: u8,
    /// Number of stores aggregated.
    pub store_count: usize,
    /// Per-store detail.
    pub stores: Vec<StoreCoverage>,
    /// Types missing in at least one store.
    pub missing_types: Vec<String>,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
}

/// Score a single store.
///
/// A jurisdiction with no requirements scores 0, like a store with no documents.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn store_coverage(
    store: &RetailStore,
    documents: &[LegalDocument],
    requirements: &Requirements,
    now: DateTime<Utc>,
) -> StoreCoverage {
    let required_types = requirements.required_for(&store.jurisdiction);

    let available: BTreeSet<&str> = documents
        .iter()
        .filter(|d| d.in_effect(now) && d.applies_to(store))
        .map(|d| d.doc_type.as_str())
        .collect();

    let (found_types, missing_types): (Vec<String>, Vec<String>) = required_types
        .iter()
        .cloned()
        .partition(|t| available.contains(t.as_str()));

    // Nothing required means nothing matched.
    let score = if required_types.is_empty() {
        0
    } else {
        (100.0 * found_types.len() as f64 / required_types.len() as f64).round() as u8
    };

    StoreCoverage {
        store_id: store.id.clone(),
        store_name: store.name.clone(),
        jurisdiction: store.jurisdiction.clone(),
        score,
        required_types,
        found_types,
        missing_types,
    }
}

/// Aggregate a set of stores into one entity snapshot.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn entity_snapshot(
    scope: SnapshotScope,
    entity_id: &str,
    entity_name: &str,
    stores: &[&RetailStore],
    inputs: &ComplianceInputs,
    now: DateTime<Utc>,
) -> ComplianceSnapshot {
    let coverage: Vec<StoreCoverage> = stores
        .iter()
        .map(|s| store_coverage(s, &inputs.documents, &inputs.requirements, now))
        .collect();

    let score = if coverage.is_empty() {
        0
    } else {
        let total: f64 = coverage.iter().map(|c| f64::from(c.score)).sum();
        (total / coverage.len() as f64).round() as u8
    };

    let missing_types: BTreeSet<String> = coverage
        .iter()
        .flat_map(|c| c.missing_types.iter().cloned())
        .collect();

    ComplianceSnapshot {
        scope,
        entity_id: entity_id.to_string(),
        entity_name: entity_name.to_string(),
        score,
        store_count: coverage.len(),
        stores: coverage,
        missing_types: missing_types.into_iter().collect(),
        computed_at: now,
    }
}

/// Snapshots for every organization, then every brand.
#[must_use]
pub fn build_snapshots(inputs: &ComplianceInputs, now: DateTime<Utc>) -> Vec<ComplianceSnapshot> {
    let org_snapshots = inputs.organizations.iter().map(|org| {
        let stores: Vec<&RetailStore> = inputs
            .stores
            .iter()
            .filter(|s| s.organization_id.as_deref() == Some(org.id.as_str()))
            .collect();
        entity_snapshot(
            SnapshotScope::Organization,
            &org.id,
            &org.name,
            &stores,
            inputs,
            now,
        )
    });

    let brand_snapshots = inputs.brands.iter().map(|brand| {
        let stores: Vec<&RetailStore> = inputs
            .stores
            .iter()
            .filter(|s| s.brand_id.as_deref() == Some(brand.id.as_str()))
            .collect();
        entity_snapshot(
            SnapshotScope::Brand,
            &brand.id,
            &brand.name,
            &stores,
            inputs,
            now,
        )
    });

    org_snapshots.chain(brand_snapshots).collect()
}
