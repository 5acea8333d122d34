//! Webhook signature verification and event payloads.
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! A payload is authentic when any `v1` value equals
//! `HMAC-SHA256(secret, "<t>." + raw body)` and `t` is recent.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Oldest accepted timestamp, in seconds before now.
const TOLERANCE_SECS: i64 = 300;

/// Furthest accepted timestamp, in seconds after now.
const FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing Stripe-Signature header")]
    MissingHeader,
    #[error("malformed Stripe-Signature header")]
    MalformedHeader,
    #[error("timestamp outside the tolerance window")]
    TimestampOutOfTolerance,
    #[error("no signatures found matching the expected signature for payload")]
    NoMatchingSignature,
}

/// Verifies webhook payloads against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Check `header` against the raw `payload` at time `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns the [`SignatureError`] describing why the payload is not authentic.
    pub fn verify(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), SignatureError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", sig)) => candidates.push(sig),
                _ => {}
            }
        }

        let timestamp_str = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| SignatureError::MalformedHeader)?;

        let age = now.saturating_sub(timestamp);
        if age > TOLERANCE_SECS || age < -FUTURE_SKEW_SECS {
            tracing::warn!(age, "Stripe webhook timestamp outside tolerance");
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let expected = self.sign(timestamp_str, payload)?;
        if candidates
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            Ok(())
        } else {
            Err(SignatureError::NoMatchingSignature)
        }
    }

    /// Hex HMAC of `"<timestamp>." + payload`.
    fn sign(&self, timestamp: &str, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::NoMatchingSignature)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build a valid header for `payload`, for tests and local tooling.
    ///
    /// # Errors
    ///
    /// Fails only if the secret cannot key an HMAC.
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let t = timestamp.to_string();
        let sig = self.sign(&t, payload)?;
        Ok(format!("t={t},v1={sig}"))
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Envelope shared by all event types.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// `checkout.session.completed` object.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("whsec_test_secret"))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let v = verifier();
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = v.signature_header(body, NOW).unwrap();
        assert_eq!(v.verify(body, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn test_any_v1_may_match() {
        let v = verifier();
        let body = b"{}";
        let good = v.signature_header(body, NOW).unwrap();
        let sig = good.split_once("v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={sig}", "0".repeat(64));
        assert_eq!(v.verify(body, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let v = verifier();
        let header = v.signature_header(b"{\"a\":1}", NOW).unwrap();
        assert_eq!(
            v.verify(b"{\"a\":2}", Some(&header), NOW),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let other = WebhookVerifier::new(SecretString::from("whsec_other"));
        let header = other.signature_header(b"{}", NOW).unwrap();
        assert_eq!(
            verifier().verify(b"{}", Some(&header), NOW),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn test_timestamp_window() {
        let v = verifier();
        let old = v.signature_header(b"{}", NOW - 301).unwrap();
        assert_eq!(
            v.verify(b"{}", Some(&old), NOW),
            Err(SignatureError::TimestampOutOfTolerance)
        );

        let edge = v.signature_header(b"{}", NOW - 300).unwrap();
        assert_eq!(v.verify(b"{}", Some(&edge), NOW), Ok(()));

        let future = v.signature_header(b"{}", NOW + 61).unwrap();
        assert_eq!(
            v.verify(b"{}", Some(&future), NOW),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_header_shape() {
        let v = verifier();
        assert_eq!(v.verify(b"{}", None, NOW), Err(SignatureError::MissingHeader));
        assert_eq!(v.verify(b"{}", Some("  "), NOW), Err(SignatureError::MissingHeader));
        assert_eq!(
            v.verify(b"{}", Some("v1=abc"), NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify(b"{}", Some(&format!("t={NOW}")), NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify(b"{}", Some("t=soon,v1=abc"), NOW),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }

    #[test]
    fn test_event_parses_metadata() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1","metadata":{"orderId":"o1"}}}}"#,
        )
        .unwrap();
        let session: CheckoutSessionObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.metadata["orderId"], "o1");
    }
}
