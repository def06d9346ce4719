//! Verification of Slack request signatures.
//!
//! Slack signs every webhook request with
//! `v0=hex(HMAC-SHA256(signing_secret, "v0:{timestamp}:{raw body}"))` and sends the
//! result in `X-Slack-Signature` next to `X-Slack-Request-Timestamp`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Requests whose timestamp is further than this from the local clock are rejected.
pub const MAX_TIMESTAMP_SKEW_SECS: u64 = 300;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp {timestamp} is outside the allowed window (now {now})")]
    ExpiredTimestamp { timestamp: i64, now: i64 },
    #[error("signing secret cannot be used as an HMAC key")]
    InvalidSecret,
    #[error("request signature does not match")]
    Mismatch,
}

/// Accumulates the raw request body and checks it against the signature header.
pub struct SignatureVerifier {
    mac: HmacSha256,
    signature: String,
}

impl SignatureVerifier {
    pub fn new(
        signing_secret: &str,
        timestamp: Option<&str>,
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, SignatureError> {
        let timestamp =
            non_empty(timestamp).ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature =
            non_empty(signature).ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let issued_at = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let now = now.timestamp();
        if now.abs_diff(issued_at) > MAX_TIMESTAMP_SKEW_SECS {
            return Err(SignatureError::ExpiredTimestamp { timestamp: issued_at, now });
        }

        let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");

        Ok(Self { mac, signature: signature.to_owned() })
    }

    pub fn update(&mut self, body: &[u8]) {
        self.mac.update(body);
    }

    /// Constant-time comparison of the computed digest with the `X-Slack-Signature` value.
    pub fn ensure(self) -> Result<(), SignatureError> {
        let Some(encoded) = self
            .signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
        else {
            return Err(SignatureError::Mismatch);
        };
        let expected = hex::decode(encoded).map_err(|_| SignatureError::Mismatch)?;

        self.mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

/// Produces the `X-Slack-Signature` value Slack would send for `body`.
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(format!("{SIGNATURE_VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes())))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
