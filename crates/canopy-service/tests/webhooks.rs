//! Sanity webhook integration tests.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use common::{TestHarness, WEBHOOK_SECRET};

use canopy_service::crypto::sign_webhook;

const BODY: &str = r#"{"_id":"loyaltyConfig.main","_type":"loyaltyConfig"}"#;

fn signature_header(value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("sanity-webhook-signature"),
        HeaderValue::from_str(value).unwrap(),
    )
}

#[tokio::test]
async fn accepts_signed_delivery() {
    let harness = TestHarness::new();
    let signature =
        sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp_millis(), BODY.as_bytes()).unwrap();
    let (name, value) = signature_header(&signature);

    let response = harness
        .server
        .post("/webhooks/sanity")
        .add_header(name, value)
        .text(BODY)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["received"], true);
}

#[tokio::test]
async fn rejects_missing_signature() {
    let harness = TestHarness::new();

    let response = harness.server.post("/webhooks/sanity").text(BODY).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejects_wrong_secret() {
    let harness = TestHarness::new();
    let signature =
        sign_webhook("not-the-secret", chrono::Utc::now().timestamp_millis(), BODY.as_bytes()).unwrap();
    let (name, value) = signature_header(&signature);

    let response = harness
        .server
        .post("/webhooks/sanity")
        .add_header(name, value)
        .text(BODY)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejects_stale_timestamp() {
    let harness = TestHarness::new();
    let stale = chrono::Utc::now().timestamp_millis() - 3_600_000;
    let signature = sign_webhook(WEBHOOK_SECRET, stale, BODY.as_bytes()).unwrap();
    let (name, value) = signature_header(&signature);

    let response = harness
        .server
        .post("/webhooks/sanity")
        .add_header(name, value)
        .text(BODY)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejects_seconds_timestamp() {
    let harness = TestHarness::new();
    let signature =
        sign_webhook(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), BODY.as_bytes()).unwrap();
    let (name, value) = signature_header(&signature);

    let response = harness
        .server
        .post("/webhooks/sanity")
        .add_header(name, value)
        .text(BODY)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn overflowing_timestamp_is_unauthorized() {
    let harness = TestHarness::new();
    let (name, value) = signature_header("t=-9223372036854775808,v1=ab");

    let response = harness
        .server
        .post("/webhooks/sanity")
        .add_header(name, value)
        .text(BODY)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}
