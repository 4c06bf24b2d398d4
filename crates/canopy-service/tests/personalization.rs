//! Personalization endpoint integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;

use canopy_service::ContentFixture;

fn harness() -> TestHarness {
    let fixture: ContentFixture = serde_json::from_value(serde_json::json!({
        "personalizationRules": [
            {
                "id": "new-shoppers-deals",
                "conditions": [{ "field": "user.orderCount", "op": "lt", "value": 1 }],
                "action": { "priorityBoost": 10.0, "target": { "contentTypes": ["deal"] } }
            },
            {
                "id": "edibles-fans",
                "conditions": [{ "field": "user.favorites", "op": "contains", "value": "edibles" }],
                "action": { "priorityBoost": 5.0, "target": { "tags": ["edibles"] } }
            },
            {
                "id": "other-org",
                "organizationId": "org-2",
                "action": { "priorityBoost": 100.0 }
            },
            {
                "id": "disabled",
                "active": false,
                "action": { "priorityBoost": 50.0 }
            }
        ]
    }))
    .unwrap();
    TestHarness::with_fixture(fixture)
}

fn candidates() -> serde_json::Value {
    serde_json::json!([
        { "id": "article-1", "contentType": "article", "tags": ["flower"] },
        { "id": "deal-1", "contentType": "deal", "tags": ["flower"] },
        { "id": "article-2", "contentType": "article", "tags": ["edibles"] }
    ])
}

#[tokio::test]
async fn ranks_candidates_by_matching_rules() {
    let harness = harness();

    let response = harness
        .server
        .post("/content/personalization")
        .json(&serde_json::json!({
            "organizationId": "org-1",
            "context": { "user": { "orderCount": 0, "favorites": ["edibles"] } },
            "candidates": candidates(),
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let ids: Vec<&str> = body["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["deal-1", "article-2", "article-1"]);
    assert_eq!(body["data"]["results"][2]["score"], 0.0);
    assert_eq!(
        body["data"]["results"][0]["matchedRules"],
        serde_json::json!(["new-shoppers-deals"])
    );
}

#[tokio::test]
async fn no_matching_rules_keeps_input_order() {
    let harness = harness();
    let request = serde_json::json!({
        "organizationId": "org-1",
        "context": { "user": { "orderCount": 3 } },
        "candidates": candidates(),
    });

    let first: serde_json::Value = harness
        .server
        .post("/content/personalization")
        .json(&request)
        .await
        .json();
    let second: serde_json::Value = harness
        .server
        .post("/content/personalization")
        .json(&request)
        .await
        .json();

    assert_eq!(first, second);
    let ids: Vec<&str> = first["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["article-1", "deal-1", "article-2"]);
}

#[tokio::test]
async fn rejects_blank_candidate_ids() {
    let harness = harness();

    let response = harness
        .server
        .post("/content/personalization")
        .json(&serde_json::json!({ "candidates": [{ "id": "" }] }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["details"]["issues"][0]["path"], "candidates.0.id");
}

#[tokio::test]
async fn malformed_json_is_validation_error() {
    let harness = harness();

    let response = harness
        .server
        .post("/content/personalization")
        .text("{ not json")
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
