//! CMS webhook handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::crypto::verify_webhook_signature;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the Sanity delivery signature.
pub const SIGNATURE_HEADER: &str = "sanity-webhook-signature";

/// Fields logged from a delivery.
#[derive(Debug, Deserialize)]
struct SanityDelivery {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_type", default)]
    doc_type: Option<String>,
}

/// Receive a Sanity document change notification.
///
/// The signature is checked when a webhook secret is configured. Deliveries
/// are logged only; cached programs expire on their TTL.
pub async fn sanity_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if let Some(secret) = &state.config.sanity_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let now = chrono::Utc::now().timestamp_millis();
        verify_webhook_signature(secret, signature, &body, now).map_err(|e| {
            tracing::warn!(error = %e, "Sanity webhook signature rejected");
            ApiError::Unauthorized
        })?;
    }

    let delivery: SanityDelivery = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid("body", format!("invalid JSON: {e}")))?;

    tracing::info!(
        document_id = delivery.id.as_deref().unwrap_or("-"),
        document_type = delivery.doc_type.as_deref().unwrap_or("-"),
        "Sanity webhook received"
    );

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "received": true }),
    )))
}
