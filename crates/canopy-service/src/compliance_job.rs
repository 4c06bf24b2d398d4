//! Background compliance snapshot job.
//!
//! Pulls tenants, stores and legal documents from the CMS, scores coverage
//! per organization and brand, and writes the snapshots back as documents.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::interval;

use canopy_core::{build_snapshots, ComplianceSnapshot, SnapshotScope};

use crate::cms::{ContentError, ContentSource};

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRunReport {
    /// When the run started.
    pub run_at: DateTime<Utc>,
    /// Snapshots computed.
    pub entity_count: usize,
    /// Snapshots whose write failed.
    pub failed_count: usize,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

/// Computes and publishes compliance snapshots.
#[derive(Clone)]
pub struct ComplianceJob {
    content: Arc<dyn ContentSource>,
    interval: Duration,
    running: Arc<Mutex<()>>,
}

impl ComplianceJob {
    /// Create a job that runs every `interval` once spawned.
    pub fn new(content: Arc<dyn ContentSource>, interval: Duration) -> Self {
        Self {
            content,
            interval,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run on a timer in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.start().await;
        })
    }

    async fn start(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting compliance job");

        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "Compliance run failed");
            }
        }
    }

    /// Compute and write every snapshot once.
    ///
    /// Runs never overlap; a caller arriving mid-run waits for it to finish.
    /// Each entity's write is independent, so a failed write is counted in
    /// the report instead of aborting the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the inputs cannot be fetched.
    pub async fn run_once(&self) -> Result<ComplianceRunReport, ContentError> {
        let _guard = self.running.lock().await;
        let started = Instant::now();
        let run_at = Utc::now();

        let inputs = self.content.compliance_inputs().await?;
        let snapshots = build_snapshots(&inputs, run_at);

        let mut failed_by_scope = [0usize; 2];
        let mut count_by_scope = [0usize; 2];
        for snapshot in &snapshots {
            let slot = scope_slot(snapshot.scope);
            count_by_scope[slot] += 1;

            if let Err(e) = self
                .content
                .write_documents(snapshot_documents(snapshot))
                .await
            {
                failed_by_scope[slot] += 1;
                tracing::warn!(
                    scope = snapshot.scope.as_str(),
                    entity_id = %snapshot.entity_id,
                    error = %e,
                    "Failed to write compliance snapshot"
                );
            }
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        for scope in [SnapshotScope::Organization, SnapshotScope::Brand] {
            let slot = scope_slot(scope);
            let monitor = serde_json::json!({
                "_id": format!("complianceMonitor.{}", scope.as_str()),
                "_type": "complianceMonitor",
                "scope": scope,
                "lastRunAt": run_at,
                "entityCount": count_by_scope[slot],
                "failedCount": failed_by_scope[slot],
                "durationMs": duration_ms,
            });
            if let Err(e) = self.content.write_documents(vec![monitor]).await {
                tracing::warn!(scope = scope.as_str(), error = %e, "Failed to write compliance monitor");
            }
        }

        let report = ComplianceRunReport {
            run_at,
            entity_count: snapshots.len(),
            failed_count: failed_by_scope.iter().sum(),
            duration_ms,
        };

        tracing::info!(
            entity_count = report.entity_count,
            failed_count = report.failed_count,
            duration_ms = report.duration_ms,
            "Compliance run finished"
        );

        Ok(report)
    }
}

const fn scope_slot(scope: SnapshotScope) -> usize {
    match scope {
        SnapshotScope::Organization => 0,
        SnapshotScope::Brand => 1,
    }
}

/// History and latest documents for one snapshot.
fn snapshot_documents(snapshot: &ComplianceSnapshot) -> Vec<serde_json::Value> {
    let scope = snapshot.scope.as_str();
    let mut history = serde_json::json!(snapshot);
    let mut latest = history.clone();

    history["_id"] = format!(
        "complianceSnapshot.{scope}.{}.{}",
        snapshot.entity_id,
        snapshot.computed_at.timestamp_millis()
    )
    .into();
    history["_type"] = "complianceSnapshot".into();

    latest["_id"] = format!("complianceSnapshotLatest.{scope}.{}", snapshot.entity_id).into();
    latest["_type"] = "complianceSnapshotLatest".into();

    vec![history, latest]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use canopy_core::{
        Brand, ComplianceInputs, LegalDocument, LoyaltyConfig, Organization,
        PersonalizationRule, Requirements, RetailStore, TenantScope,
    };

    use crate::cms::{ContentFixture, StaticContent};

    fn inputs() -> ComplianceInputs {
        ComplianceInputs {
            organizations: vec![
                Organization {
                    id: "org-1".into(),
                    name: "Green Co".into(),
                },
                Organization {
                    id: "org-2".into(),
                    name: "Leaf Inc".into(),
                },
            ],
            brands: vec![Brand {
                id: "brand-1".into(),
                name: "Green Label".into(),
                organization_id: Some("org-1".into()),
            }],
            stores: vec![RetailStore {
                id: "store-1".into(),
                name: "Downtown".into(),
                organization_id: Some("org-1".into()),
                brand_id: Some("brand-1".into()),
                jurisdiction: "US-CO".into(),
            }],
            documents: vec![LegalDocument {
                id: "doc-1".into(),
                doc_type: "terms".into(),
                jurisdiction: None,
                organization_id: None,
                brand_id: None,
                store_id: None,
                effective_from: None,
                effective_to: None,
                version: Some("1".into()),
            }],
            requirements: Requirements {
                default_types: vec!["terms".into(), "privacy".into()],
                ..Requirements::default()
            },
        }
    }

    /// Content source whose writes fail for one entity.
    struct FlakyContent {
        inputs: ComplianceInputs,
        fail_entity: &'static str,
        written: StdMutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl ContentSource for FlakyContent {
        async fn loyalty_config(&self, _: &TenantScope) -> Result<LoyaltyConfig, ContentError> {
            Ok(LoyaltyConfig::default())
        }

        async fn personalization_rules(
            &self,
            _: &TenantScope,
        ) -> Result<Vec<PersonalizationRule>, ContentError> {
            Ok(Vec::new())
        }

        async fn compliance_inputs(&self) -> Result<ComplianceInputs, ContentError> {
            Ok(self.inputs.clone())
        }

        async fn write_documents(&self, docs: Vec<serde_json::Value>) -> Result<(), ContentError> {
            if docs.iter().any(|d| d["entityId"] == self.fail_entity) {
                return Err(ContentError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            self.written.lock().unwrap().extend(docs);
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_history_latest_and_monitors() {
        let content = Arc::new(StaticContent::new(ContentFixture {
            compliance: inputs(),
            ..ContentFixture::default()
        }));
        let job = ComplianceJob::new(content.clone(), Duration::from_secs(60));

        let report = job.run_once().await.unwrap();
        assert_eq!(report.entity_count, 3);
        assert_eq!(report.failed_count, 0);

        let docs = content.written_documents();
        // 3 entities x (history + latest) + 2 monitors
        assert_eq!(docs.len(), 8);

        let latest = docs
            .iter()
            .find(|d| d["_id"] == "complianceSnapshotLatest.organization.org-1")
            .unwrap();
        assert_eq!(latest["score"], 50);
        assert_eq!(latest["missingTypes"], serde_json::json!(["privacy"]));

        let empty_org = docs
            .iter()
            .find(|d| d["_id"] == "complianceSnapshotLatest.organization.org-2")
            .unwrap();
        assert_eq!(empty_org["score"], 0);

        let monitor = docs
            .iter()
            .find(|d| d["_id"] == "complianceMonitor.brand")
            .unwrap();
        assert_eq!(monitor["entityCount"], 1);
        assert_eq!(monitor["failedCount"], 0);
    }

    #[tokio::test]
    async fn one_failed_write_does_not_stop_the_rest() {
        let content = Arc::new(FlakyContent {
            inputs: inputs(),
            fail_entity: "org-1",
            written: StdMutex::new(Vec::new()),
        });
        let job = ComplianceJob::new(content.clone(), Duration::from_secs(60));

        let report = job.run_once().await.unwrap();
        assert_eq!(report.entity_count, 3);
        assert_eq!(report.failed_count, 1);

        let written = content.written.lock().unwrap();
        assert!(written
            .iter()
            .any(|d| d["_id"] == "complianceSnapshotLatest.brand.brand-1"));
        let org_monitor = written
            .iter()
            .find(|d| d["_id"] == "complianceMonitor.organization")
            .unwrap();
        assert_eq!(org_monitor["failedCount"], 1);
    }
}
