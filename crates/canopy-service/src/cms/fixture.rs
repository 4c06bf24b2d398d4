//! In-memory content source backed by a JSON fixture.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use canopy_core::{ComplianceInputs, LoyaltyConfig, PersonalizationRule, TenantScope};

use super::types::{select_config, ScopedConfig, ScopedRule};
use super::{ContentError, ContentSource};

/// Content as it appears in a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFixture {
    /// Loyalty programs, each with its tenant fields.
    #[serde(default)]
    pub loyalty_configs: Vec<ScopedConfig>,
    /// Personalization rules, each with its tenant fields.
    #[serde(default)]
    pub personalization_rules: Vec<ScopedRule>,
    /// Compliance inputs.
    #[serde(default)]
    pub compliance: ComplianceInputs,
}

/// Most documents [`StaticContent`] keeps; the oldest are dropped first.
pub const MAX_WRITTEN_DOCUMENTS: usize = 1_000;

/// Serves a fixture and records documents written to it.
///
/// Writes follow `createOrReplace`: a document whose `_id` was already written
/// replaces the earlier copy.
#[derive(Debug, Default)]
pub struct StaticContent {
    fixture: ContentFixture,
    written: Mutex<VecDeque<serde_json::Value>>,
}

impl StaticContent {
    /// Serve `fixture`.
    #[must_use]
    pub fn new(fixture: ContentFixture) -> Self {
        Self {
            fixture,
            written: Mutex::new(VecDeque::new()),
        }
    }

    /// Load a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Configuration` if the file cannot be read, or
    /// `ContentError::Serialization` if it is not a valid fixture.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ContentError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Self::new(serde_json::from_str(&contents)?))
    }

    /// Documents written so far, oldest first.
    #[must_use]
    pub fn written_documents(&self) -> Vec<serde_json::Value> {
        self.written
            .lock()
            .map(|docs| docs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentSource for StaticContent {
    async fn loyalty_config(&self, scope: &TenantScope) -> Result<LoyaltyConfig, ContentError> {
        Ok(select_config(self.fixture.loyalty_configs.clone(), scope))
    }

    async fn personalization_rules(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<PersonalizationRule>, ContentError> {
        Ok(self
            .fixture
            .personalization_rules
            .iter()
            .filter(|r| r.scope.covers(scope))
            .map(|r| r.rule.clone())
            .collect())
    }

    async fn compliance_inputs(&self) -> Result<ComplianceInputs, ContentError> {
        Ok(self.fixture.compliance.clone())
    }

    async fn write_documents(&self, documents: Vec<serde_json::Value>) -> Result<(), ContentError> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| ContentError::Configuration("fixture write log poisoned".into()))?;
        for document in documents {
            let id = document.get("_id").cloned();
            if id.is_some() {
                written.retain(|existing| existing.get("_id") != id.as_ref());
            }
            written.push_back(document);
        }
        while written.len() > MAX_WRITTEN_DOCUMENTS {
            written.pop_front();
        }
        Ok(())
    }
}
