//! Compliance run integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;

use canopy_service::ContentFixture;

fn harness() -> TestHarness {
    let fixture: ContentFixture = serde_json::from_value(serde_json::json!({
        "compliance": {
            "organizations": [{ "id": "org-1", "name": "Green Co" }],
            "brands": [{ "id": "brand-1", "name": "Green Label", "organizationId": "org-1" }],
            "stores": [
                { "id": "s-co", "name": "Denver", "organizationId": "org-1",
                  "brandId": "brand-1", "jurisdiction": "US-CO" },
                { "id": "s-ca", "name": "Oakland", "organizationId": "org-1",
                  "jurisdiction": "US-CA" }
            ],
            "documents": [
                { "id": "d-terms", "docType": "terms" },
                { "id": "d-prop65", "docType": "prop65", "jurisdiction": "US-CA" }
            ],
            "requirements": {
                "defaultTypes": ["terms", "privacy"],
                "byJurisdiction": { "US-CA": ["terms", "prop65"] }
            }
        }
    }))
    .unwrap();
    TestHarness::with_fixture(fixture)
}

#[tokio::test]
async fn run_requires_admin_session() {
    let harness = harness();

    let response = harness.server.post("/api/admin/compliance/run").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn run_scores_entities_and_writes_documents() {
    let harness = harness();
    let owner = harness.admin_login("owner@shop.example").await;

    let response = harness
        .admin(harness.server.post("/api/admin/compliance/run"), &owner)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["entityCount"], 2);
    assert_eq!(body["data"]["failedCount"], 0);

    let docs = harness.content.written_documents();
    let find = |id: &str| {
        docs.iter()
            .find(|d| d["_id"] == id)
            .unwrap_or_else(|| panic!("missing document {id}"))
            .clone()
    };

    // Denver: 1 of 2 (privacy missing) = 50; Oakland: 2 of 2 = 100.
    let org = find("complianceSnapshotLatest.organization.org-1");
    assert_eq!(org["score"], 75);
    assert_eq!(org["storeCount"], 2);
    assert_eq!(org["missingTypes"], serde_json::json!(["privacy"]));

    let brand = find("complianceSnapshotLatest.brand.brand-1");
    assert_eq!(brand["score"], 50);

    let monitor = find("complianceMonitor.organization");
    assert_eq!(monitor["entityCount"], 1);
    assert!(monitor["lastRunAt"].is_string());

    let history = docs
        .iter()
        .filter(|d| d["_type"] == "complianceSnapshot")
        .count();
    assert_eq!(history, 2);
}
