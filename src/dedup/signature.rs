//! Stripe-style webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex HMAC-SHA256>[,v1=...]`. The MAC
//! covers `"<t>.<payload>"` keyed with the endpoint secret.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::clock::{duration_secs, Clock, SystemClock};

type HmacSha256 = Hmac<Sha256>;

/// Default accepted distance between the signed timestamp and now.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` digest present, hex encoded.
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parse a header; `None` if the timestamp or all `v1` entries are missing.
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = value.trim().parse::<i64>().ok(),
                "v1" => signatures.push(value.trim().to_string()),
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Some(Self {
                timestamp,
                signatures,
            }),
            _ => None,
        }
    }
}

fn signed_mac(payload: &str, secret: &str, timestamp: i64) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Some(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`.
pub fn compute_stripe_signature(payload: &str, secret: &str, timestamp: i64) -> String {
    signed_mac(payload, secret, timestamp)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Build a complete `t=...,v1=...` header.
pub fn stripe_signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        compute_stripe_signature(payload, secret, timestamp)
    )
}

/// Verify a header against the system clock with the default tolerance.
pub fn validate_stripe_signature(payload: &str, header: &str, secret: &str) -> bool {
    validate_stripe_signature_at(payload, header, secret, DEFAULT_TOLERANCE, SystemClock.now_secs())
}

/// Verify a header at `now_secs` with the given tolerance. Never panics.
pub fn validate_stripe_signature_at(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance: Duration,
    now_secs: i64,
) -> bool {
    let Some(parsed) = SignatureHeader::parse(header) else {
        tracing::debug!("Malformed webhook signature header");
        return false;
    };

    if now_secs.abs_diff(parsed.timestamp) > duration_secs(tolerance).unsigned_abs() {
        tracing::warn!(
            timestamp = parsed.timestamp,
            now = now_secs,
            "Webhook signature timestamp outside tolerance"
        );
        return false;
    }

    // Constant-time comparison via verify_slice.
    parsed.signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        signed_mac(payload, secret, parsed.timestamp)
            .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"id":"evt_123"}"#;
    const SECRET: &str = "whsec_test";

    fn now() -> i64 {
        SystemClock.now_secs()
    }

    #[test]
    fn test_valid_signature() {
        let header = stripe_signature_header(PAYLOAD, SECRET, now());
        assert!(validate_stripe_signature(PAYLOAD, &header, SECRET));
    }

    #[test]
    fn test_wrong_secret() {
        let header = stripe_signature_header(PAYLOAD, "whsec_other", now());
        assert!(!validate_stripe_signature(PAYLOAD, &header, SECRET));
    }

    #[test]
    fn test_tampered_payload() {
        let header = stripe_signature_header(PAYLOAD, SECRET, now());
        assert!(!validate_stripe_signature(r#"{"id":"evt_124"}"#, &header, SECRET));
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let ts = now() - 301;
        let header = stripe_signature_header(PAYLOAD, SECRET, ts);
        assert!(!validate_stripe_signature(PAYLOAD, &header, SECRET));
    }

    #[test]
    fn test_tolerance_boundary() {
        let header = stripe_signature_header(PAYLOAD, SECRET, 1_000);
        assert!(validate_stripe_signature_at(PAYLOAD, &header, SECRET, DEFAULT_TOLERANCE, 1_300));
        assert!(!validate_stripe_signature_at(PAYLOAD, &header, SECRET, DEFAULT_TOLERANCE, 1_301));
        assert!(validate_stripe_signature_at(PAYLOAD, &header, SECRET, DEFAULT_TOLERANCE, 700));
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "",
            "garbage",
            "t=abc,v1=00",
            "v1=deadbeef",
            "t=1700000000",
            "t=1700000000,v1=not-hex",
        ] {
            assert!(!validate_stripe_signature(PAYLOAD, header, SECRET), "{header}");
        }
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let ts = now();
        let good = compute_stripe_signature(PAYLOAD, SECRET, ts);
        let header = format!("t={ts},v1={},v0=legacy,v1={good}", "00".repeat(32));
        assert!(validate_stripe_signature(PAYLOAD, &header, SECRET));
    }

    #[test]
    fn test_parse_header() {
        let parsed = SignatureHeader::parse(" t=12 , v1=ab ,v1=cd").unwrap();
        assert_eq!(parsed.timestamp, 12);
        assert_eq!(parsed.signatures, vec!["ab", "cd"]);
    }
}
