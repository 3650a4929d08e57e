//! Webhook Signature Verification
//!
//! `stripe-signature` header format: `t=<unix timestamp>,v1=<hex signature>`
//! where the signature is HMAC-SHA256 over `"{t}.{raw body}"`. The header may
//! carry several `v1` entries while a secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between signing and verification, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a signature header against the current time
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, tolerance_secs: i64) -> Result<()> {
    verify_signature_at(payload, header, secret, tolerance_secs, chrono::Utc::now().timestamp())
}

/// Verify a signature header against an explicit `now`
pub fn verify_signature_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let raw_timestamp =
        timestamp.ok_or_else(|| PaymentError::Signature("missing timestamp".into()))?;
    let timestamp: i64 = raw_timestamp
        .parse()
        .map_err(|_| PaymentError::Signature("malformed timestamp".into()))?;
    if signatures.is_empty() {
        return Err(PaymentError::Signature("missing v1 signature".into()));
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(PaymentError::Signature("timestamp outside tolerance".into()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Signature(e.to_string()))?;
    mac.update(raw_timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(PaymentError::Signature("no matching v1 signature".into()))
    }
}

/// Produce a header for `payload` (test fixtures, local tooling)
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Signature(e.to_string()))?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;
    const PAYLOAD: &[u8] = b"{\"type\":\"checkout.session.completed\"}";

    #[test]
    fn test_valid_signature() {
        let header = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        assert!(verify_signature_at(PAYLOAD, &header, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn test_wrong_secret() {
        let header = sign_payload(PAYLOAD, "wrong_secret", NOW).unwrap();
        assert!(verify_signature_at(PAYLOAD, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_modified_payload() {
        let header = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        let tampered = b"{\"type\":\"checkout.session.completed\",\"hacked\":true}";
        assert!(verify_signature_at(tampered, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp() {
        let header = sign_payload(PAYLOAD, SECRET, NOW - 600).unwrap();
        let err = verify_signature_at(PAYLOAD, &header, SECRET, 300, NOW).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign_payload(PAYLOAD, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig},v0=ignored");
        assert!(verify_signature_at(PAYLOAD, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(verify_signature_at(PAYLOAD, "", SECRET, 300, NOW).is_err());
        assert!(verify_signature_at(PAYLOAD, "v1=abc", SECRET, 300, NOW).is_err());
        assert!(verify_signature_at(PAYLOAD, "t=123", SECRET, 300, NOW).is_err());
        assert!(verify_signature_at(PAYLOAD, "t=abc,v1=00", SECRET, 300, NOW).is_err());
        assert!(verify_signature_at(PAYLOAD, &format!("t={NOW},v1=not-hex"), SECRET, 300, NOW).is_err());
    }
}
