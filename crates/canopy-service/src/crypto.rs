//! Cryptographic utilities for webhook verification.
//!
//! Sanity signs webhook deliveries with a header of the form
//! `t=<unix millis>,v1=<digest>` where the digest is the unpadded base64url
//! HMAC-SHA256 of `<t>.<raw body>`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook delivery, in milliseconds.
pub const SIGNATURE_TOLERANCE_MILLIS: u64 = 5 * 60 * 1000;

/// Webhook signature failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Header missing `t` or `v1`, or `t` not numeric.
    #[error("malformed signature header")]
    Malformed,

    /// Timestamp outside the tolerance window.
    #[error("signature timestamp outside tolerance")]
    Expired,

    /// Digest does not match.
    #[error("signature mismatch")]
    Mismatch,

    /// The secret could not key the MAC.
    #[error("invalid signing key")]
    InvalidKey,
}

/// Compute HMAC-SHA256 and return it as unpadded base64url.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the MAC rejects the key.
pub fn hmac_sha256_base64url(secret: &str, message: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(message);
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Sign a payload the way Sanity does; used by tests and tooling.
///
/// `timestamp` is in Unix milliseconds.
///
/// # Errors
///
/// Returns `SignatureError::InvalidKey` if the MAC rejects the key.
pub fn sign_webhook(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let digest = hmac_sha256_base64url(secret, &signed_payload(timestamp, body))?;
    Ok(format!("t={timestamp},v1={digest}"))
}

/// Verify a `sanity-webhook-signature` header against the raw body.
///
/// `now` is the current time in Unix milliseconds.
///
/// # Errors
///
/// Returns a [`SignatureError`] describing why the header was rejected.
pub fn verify_webhook_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_MILLIS {
        return Err(SignatureError::Expired);
    }

    let expected = hmac_sha256_base64url(secret, &signed_payload(timestamp, body))?;
    if signatures.iter().any(|sig| constant_time_eq(sig, &expected)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn signed_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut payload = format!("{timestamp}.").into_bytes();
    payload.extend_from_slice(body);
    payload
}
