//! Signed, expiring state tokens for OAuth redirects.
//!
//! A state token carries the initiating user's email through the provider
//! redirect so the callback can bind the returned code to an identity without
//! placing a raw email in the URL. Token format: `base64url(email|unix_ts)`
//! plus, when a signing key is configured, `"." + base64url(hmac_sha256(payload))`.
//!
//! Without a signing key the codec degrades to unsigned mode: tokens are
//! accepted on expiry alone. This is a recognized weaker mode for local
//! development, not an error.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age for OAuth flow state tokens (10 minutes).
pub const FLOW_STATE_TTL_SECS: u64 = 600;

/// Maximum age for admin session tokens (7 days).
pub const ADMIN_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Issues and verifies state tokens with an optional process-wide signing key.
#[derive(Clone)]
pub struct StateTokenCodec {
    signing_key: Option<Vec<u8>>,
}

impl StateTokenCodec {
    /// Create a codec. `signing_key` is any non-empty byte string; `None`
    /// selects unsigned mode.
    pub fn new(signing_key: Option<&str>) -> Self {
        Self {
            signing_key: signing_key
                .filter(|k| !k.is_empty())
                .map(|k| k.as_bytes().to_vec()),
        }
    }

    /// Whether tokens produced by this codec carry a signature.
    pub fn signed(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Issue a token binding `email` to the current time.
    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, unix_now())
    }

    fn issue_at(&self, email: &str, ts: u64) -> String {
        let payload = format!("{}|{}", email, ts);
        let encoded = BASE64_URL.encode(payload.as_bytes());
        match &self.signing_key {
            Some(key) => {
                let sig = sign(key, payload.as_bytes());
                format!("{}.{}", encoded, sig)
            }
            None => encoded,
        }
    }

    /// Verify a token and return the embedded email, or `None` if the
    /// signature does not match, the token is older than `max_age_secs`, or
    /// the token is malformed in any way. Never panics on attacker-controlled
    /// input.
    pub fn verify(&self, token: &str, max_age_secs: u64) -> Option<String> {
        let payload = match &self.signing_key {
            Some(key) => {
                // A keyed verifier must not accept unsigned tokens, even ones
                // a misconfigured peer produced in unsigned mode.
                let (encoded, sig) = token.rsplit_once('.')?;
                let payload_bytes = BASE64_URL.decode(encoded.as_bytes()).ok()?;
                let expected = sign(key, &payload_bytes);
                let matches: bool = expected.as_bytes().ct_eq(sig.as_bytes()).into();
                if !matches {
                    return None;
                }
                String::from_utf8(payload_bytes).ok()?
            }
            None => {
                let payload_bytes = BASE64_URL.decode(token.as_bytes()).ok()?;
                String::from_utf8(payload_bytes).ok()?
            }
        };

        let (email, ts_str) = payload.split_once('|')?;
        let ts: u64 = ts_str.parse().ok()?;
        if unix_now().saturating_sub(ts) > max_age_secs {
            return None;
        }
        Some(email.to_string())
    }
}

fn sign(key: &[u8], payload: &[u8]) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(payload);
    BASE64_URL.encode(mac.finalize().into_bytes())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
