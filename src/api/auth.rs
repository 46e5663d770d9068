//! Webhook signature verification
//!
//! Producers sign the raw request body with HMAC-SHA256 using their
//! per-source shared secret and send the hex digest in
//! `X-Webhook-Signature`. Verification is constant-time.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{LeadflowError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Hex HMAC-SHA256 of a body; used by tests and producer tooling
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature over the raw body. `Mac::verify_slice` does the
/// constant-time comparison.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> Result<()> {
    let signature = hex::decode(signature_hex.trim())
        .map_err(|_| LeadflowError::Unauthorized("malformed signature".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| LeadflowError::Internal(format!("hmac init failed: {e}")))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| LeadflowError::Unauthorized("signature mismatch".to_string()))
}

/// Pull the signature header off a request
pub fn signature_from_headers(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LeadflowError::Unauthorized("missing signature header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_signature() {
        let secret = "0123456789abcdef";
        let body = br#"{"event_type":"page_visited"}"#;
        let signature = sign(secret, body);
        assert!(verify_signature(secret, body, &signature).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let secret = "0123456789abcdef";
        let signature = sign(secret, b"original");
        let err = verify_signature(secret, b"tampered", &signature).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signature = sign("secret-a-secret-a", b"body");
        assert!(verify_signature("secret-b-secret-b", b"body", &signature).is_err());
    }

    #[test]
    fn test_malformed_hex_rejected() {
        let err = verify_signature("0123456789abcdef", b"body", "not-hex!").unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_missing_header() {
        let headers = HeaderMap::new();
        assert!(signature_from_headers(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "abcd".parse().unwrap());
        assert_eq!(signature_from_headers(&headers).unwrap(), "abcd");
    }
}
