//! WhatsApp webhook ingestion
//!
//! Verification helpers for the subscription handshake and the
//! `X-Hub-Signature-256` header, plus the processor that applies status
//! updates and answers inbound messages.

mod payload;
mod processor;

pub use payload::{
    ButtonBody, Change, ChangeValue, Entry, InboundMessage, Interactive, Profile, Reply,
    StatusError, StatusUpdate, TextBody, WebhookContact, WebhookPayload,
};
pub use processor::{WebhookProcessor, WebhookSummary};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Query of the subscription handshake
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// The challenge to echo when the handshake is valid
pub fn verify_challenge(query: &VerificationQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if query.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    query.challenge.clone()
}

/// Check `sha256=<hex>` against the HMAC-SHA256 of `body` keyed with `secret`
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature header value for `body`, as the provider computes it
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
