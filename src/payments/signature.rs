//! Webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::PaymentError;

/// Deliveries older (or newer) than this are rejected as replays.
pub const TOLERANCE_SECS: i64 = 300;

/// Parses a `Stripe-Signature` header.
///
/// # Format
/// ```text
/// t=timestamp,v1=signature[,v1=signature...]
/// ```
pub fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(PaymentError::InvalidSignature),
    }
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`.
pub fn sign(payload: &[u8], timestamp: i64, secret: &str) -> Result<String, PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a webhook signature against the endpoint secret at `now` (unix seconds).
///
/// Uses constant-time comparison and rejects timestamps outside [`TOLERANCE_SECS`].
pub fn verify_signature_at(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), PaymentError> {
    if secret.is_empty() { return Err(PaymentError::InvalidSignature); }
    let (timestamp, candidates) = parse_signature_header(header)?;
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature);
    }
    let expected = sign(payload, timestamp, secret)?;
    let matched = candidates.iter().any(|c| bool::from(expected.as_bytes().ct_eq(c.as_bytes())));
    if matched { Ok(()) } else { Err(PaymentError::InvalidSignature) }
}

pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<(), PaymentError> {
    verify_signature_at(payload, header, secret, chrono::Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn test_parse_signature_header() {
        let (t, sigs) = parse_signature_header("t=1609459200,v1=abcdef1234567890,v0=ignored").unwrap();
        assert_eq!(t, 1609459200);
        assert_eq!(sigs, vec!["abcdef1234567890".to_string()]);
    }

    #[test]
    fn test_parse_signature_header_invalid() {
        assert!(parse_signature_header("invalid").is_err());
        assert!(parse_signature_header("t=123").is_err());
        assert!(parse_signature_header("v1=abc").is_err());
    }

    #[test]
    fn test_verify_accepts_matching_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = sign(body, 1_000, SECRET).unwrap();
        assert!(verify_signature_at(body, &format!("t=1000,v1={sig}"), SECRET, 1_010).is_ok());
        // any of several v1 entries may match (secret rotation)
        assert!(verify_signature_at(body, &format!("t=1000,v1=deadbeef,v1={sig}"), SECRET, 1_010).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering_and_replays() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = sign(body, 1_000, SECRET).unwrap();
        let header = format!("t=1000,v1={sig}");
        assert!(verify_signature_at(br#"{"id":"evt_2"}"#, &header, SECRET, 1_000).is_err());
        assert!(verify_signature_at(body, &header, "whsec_other", 1_000).is_err());
        assert!(verify_signature_at(body, &header, SECRET, 1_000 + TOLERANCE_SECS + 1).is_err());
        assert!(verify_signature_at(body, &header, "", 1_000).is_err());
    }
}
