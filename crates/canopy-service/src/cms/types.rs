//! CMS document shapes.

use std::collections::HashMap;

use canopy_core::{
    Brand, LegalDocument, LoyaltyConfig, Organization, PersonalizationRule, Requirements,
    RetailStore, TenantScope,
};
use serde::{Deserialize, Serialize};

/// A loyalty program document with the tenant it was authored for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedConfig {
    /// Tenant fields (any may be absent).
    #[serde(flatten)]
    pub scope: TenantScope,
    /// The program itself.
    #[serde(flatten)]
    pub config: LoyaltyConfig,
}

/// A personalization rule with the tenant it was authored for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedRule {
    /// Tenant fields (any may be absent).
    #[serde(flatten)]
    pub scope: TenantScope,
    /// The rule itself.
    #[serde(flatten)]
    pub rule: PersonalizationRule,
}

/// Pick the most specific program covering `scope`.
///
/// Ties go to the earlier candidate. No candidate yields an empty program.
#[must_use]
pub fn select_config(candidates: Vec<ScopedConfig>, scope: &TenantScope) -> LoyaltyConfig {
    let mut best: Option<ScopedConfig> = None;
    for candidate in candidates.into_iter().filter(|c| c.scope.covers(scope)) {
        let better = best
            .as_ref()
            .map_or(true, |b| candidate.scope.specificity() > b.scope.specificity());
        if better {
            best = Some(candidate);
        }
    }
    best.map(|b| b.config).unwrap_or_default()
}

/// Per-jurisdiction entry as authored in the requirements document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRequirement {
    /// Jurisdiction code.
    pub jurisdiction: String,
    /// Required legal document types.
    #[serde(default)]
    pub types: Vec<String>,
}

/// The requirements singleton as stored in Sanity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsDocument {
    /// Types required where no jurisdiction entry exists.
    #[serde(default)]
    pub default_types: Vec<String>,
    /// Jurisdiction entries.
    #[serde(default)]
    pub by_jurisdiction: Vec<JurisdictionRequirement>,
}

impl From<RequirementsDocument> for Requirements {
    fn from(doc: RequirementsDocument) -> Self {
        let mut by_jurisdiction: HashMap<String, Vec<String>> = HashMap::new();
        for entry in doc.by_jurisdiction {
            by_jurisdiction
                .entry(entry.jurisdiction)
                .or_default()
                .extend(entry.types);
        }
        Self {
            default_types: doc.default_types,
            by_jurisdiction,
        }
    }
}

/// Raw result of the combined compliance query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceQueryResult {
    /// Organizations.
    #[serde(default)]
    pub organizations: Vec<Organization>,
    /// Brands.
    #[serde(default)]
    pub brands: Vec<Brand>,
    /// Stores.
    #[serde(default)]
    pub stores: Vec<RetailStore>,
    /// Legal documents.
    #[serde(default)]
    pub documents: Vec<LegalDocument>,
    /// Requirements singleton, `null` when not authored.
    #[serde(default)]
    pub requirements: Option<RequirementsDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::LoyaltyReward;

    fn scoped(scope: TenantScope, reward: &str) -> ScopedConfig {
        ScopedConfig {
            scope,
            config: LoyaltyConfig {
                rewards: vec![LoyaltyReward {
                    id: reward.into(),
                    name: reward.into(),
                    cost_points: 10,
                    min_tier_id: None,
                    active: true,
                }],
                ..LoyaltyConfig::default()
            },
        }
    }

    #[test]
    fn most_specific_covering_config_wins() {
        let request = TenantScope::organization("o").with_brand("b");
        let candidates = vec![
            scoped(TenantScope::default(), "global"),
            scoped(TenantScope::organization("o").with_brand("b"), "brand"),
            scoped(TenantScope::organization("o"), "org"),
            scoped(TenantScope::organization("other"), "elsewhere"),
        ];

        let config = select_config(candidates, &request);
        assert_eq!(config.rewards[0].id, "brand");
    }

    #[test]
    fn no_covering_config_is_empty() {
        let config = select_config(
            vec![scoped(TenantScope::organization("x"), "x")],
            &TenantScope::organization("o"),
        );
        assert_eq!(config, LoyaltyConfig::default());
    }

    #[test]
    fn scoped_config_parses_flat_document() {
        let doc: ScopedConfig = serde_json::from_value(serde_json::json!({
            "organizationId": "o",
            "termsVersion": "v3",
            "tiers": [{ "id": "gold", "name": "Gold", "minPoints": 500, "multiplier": 1.5 }],
            "rules": [{ "id": "r1", "name": "Dollars", "type": "dollar", "pointsPerDollar": 1.0 }],
            "rewards": []
        }))
        .unwrap();

        assert_eq!(doc.scope, TenantScope::organization("o"));
        assert_eq!(doc.config.terms_version.as_deref(), Some("v3"));
        assert_eq!(doc.config.tiers[0].multiplier, 1.5);
        assert_eq!(doc.config.rules.len(), 1);
    }

    #[test]
    fn requirements_document_merges_duplicate_jurisdictions() {
        let doc: RequirementsDocument = serde_json::from_value(serde_json::json!({
            "defaultTypes": ["terms"],
            "byJurisdiction": [
                { "jurisdiction": "US-CO", "types": ["terms"] },
                { "jurisdiction": "US-CO", "types": ["age_gate"] }
            ]
        }))
        .unwrap();

        let requirements = Requirements::from(doc);
        assert_eq!(requirements.by_jurisdiction["US-CO"], ["terms", "age_gate"]);
        assert_eq!(requirements.default_types, ["terms"]);
    }
}
