//! Webhook signature checks.
//!
//! Payment events carry `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>]`
//! where each `v1` is HMAC-SHA256 of `"{t}.{raw body}"` keyed with the
//! endpoint secret. Fulfillment events, when a secret is configured, carry a
//! bare hex HMAC-SHA256 of the raw body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payment event, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing or malformed signature header")]
    MalformedHeader,
    #[error("timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any size"),
    }
}

/// Produce a `Stripe-Signature` header value for `payload`.
pub fn sign_payment_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = mac(secret);
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a payment webhook against its signature header. `now` is unix
/// seconds; events older or newer than `tolerance_secs` are refused.
pub fn verify_payment_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    // `t` is caller supplied and may be any i64.
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    for candidate in &candidates {
        let mut mac = mac(secret);
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Hex HMAC-SHA256 of `payload`
pub fn sign_body(payload: &[u8], secret: &str) -> String {
    let mut mac = mac(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_body_signature(payload: &[u8], signature_hex: &str, secret: &str) -> Result<(), SignatureError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| SignatureError::MalformedHeader)?;
    let mut mac = mac(secret);
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Length-independent comparison of a shared secret token
pub fn tokens_match(given: &str, expected: &str) -> bool {
    let given = given.as_bytes();
    let expected = expected.as_bytes();
    let mut diff = given.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = given.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0 && !expected.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payment_payload(payload, SECRET, NOW);
        assert_eq!(verify_payment_signature(payload, &header, SECRET, NOW + 10, 300), Ok(()));
    }

    #[test]
    fn test_wrong_secret_and_modified_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payment_payload(payload, "wrong_secret", NOW);
        assert_eq!(
            verify_payment_signature(payload, &header, SECRET, NOW, 300),
            Err(SignatureError::Mismatch)
        );

        let header = sign_payment_payload(payload, SECRET, NOW);
        let tampered = br#"{"type":"checkout.session.completed","hacked":true}"#;
        assert_eq!(
            verify_payment_signature(tampered, &header, SECRET, NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = b"{}";
        let header = sign_payment_payload(payload, SECRET, NOW - 600);
        assert_eq!(
            verify_payment_signature(payload, &header, SECRET, NOW, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", t);
            assert_eq!(
                verify_payment_signature(b"{}", &header, SECRET, NOW, 300),
                Err(SignatureError::Expired)
            );
        }
    }

    #[test]
    fn test_malformed_headers() {
        for header in ["", "garbage", "v1=abcd", "t=1700000000"] {
            assert_eq!(
                verify_payment_signature(b"{}", header, SECRET, NOW, 300),
                Err(SignatureError::MalformedHeader),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign_payment_payload(payload, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);
        assert_eq!(verify_payment_signature(payload, &header, SECRET, NOW, 300), Ok(()));
    }

    #[test]
    fn test_body_signature() {
        let body = br#"{"type":"order.processed"}"#;
        let sig = sign_body(body, "pod_secret");
        assert_eq!(verify_body_signature(body, &sig, "pod_secret"), Ok(()));
        assert_eq!(
            verify_body_signature(body, &sig, "other"),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_body_signature(body, "zz", "pod_secret"),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret-path", "s3cret-path"));
        assert!(!tokens_match("s3cret-pat", "s3cret-path"));
        assert!(!tokens_match("s3cret-path-x", "s3cret-path"));
        assert!(!tokens_match("", ""));
    }
}
