//! Environment-sourced configuration.
//!
//! Everything the subsystem needs arrives through `SPENDSYNC_*` environment
//! variables: per-platform OAuth client registrations, the secret-cipher key,
//! an optional dedicated signing key for state tokens, and deployment
//! settings (data directory, bind address, redirect URI).

use crate::adapters::AppCredentials;
use crate::platform::Platform;
use std::env;
use std::path::PathBuf;

/// Deployment-level settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub redirect_uri: String,
    /// Email allowed to open an admin session.
    pub admin_email: Option<String>,
    /// Dev-only: accept a raw email in `state` when verification fails.
    pub allow_state_email_fallback: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("SPENDSYNC_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let bind_addr =
            env::var("SPENDSYNC_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8888".to_string());
        let redirect_uri = env::var("SPENDSYNC_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8888/oauth/callback".to_string());
        Self {
            data_dir: PathBuf::from(data_dir),
            bind_addr,
            redirect_uri,
            admin_email: non_empty(env::var("SPENDSYNC_ADMIN_EMAIL").ok()),
            allow_state_email_fallback: is_truthy(
                env::var("SPENDSYNC_ALLOW_STATE_EMAIL_FALLBACK")
                    .ok()
                    .as_deref(),
            ),
        }
    }
}

/// Base64-encoded 32-byte master key for the secret cipher.
pub fn encryption_key() -> Option<String> {
    non_empty(env::var("SPENDSYNC_ENCRYPTION_KEY").ok())
}

/// Key for signing state tokens; falls back to the cipher key so a single
/// configured secret covers both concerns.
pub fn signing_key() -> Option<String> {
    non_empty(env::var("SPENDSYNC_SIGNING_KEY").ok()).or_else(encryption_key)
}

/// OAuth client registration for one platform, from
/// `SPENDSYNC_OAUTH_{PLATFORM}_CLIENT_ID` / `_CLIENT_SECRET`. Missing
/// variables leave the field `None`; the adapter degrades accordingly.
pub fn platform_credentials(platform: Platform) -> AppCredentials {
    let prefix = platform.env_prefix();
    AppCredentials {
        client_id: non_empty(env::var(format!("SPENDSYNC_OAUTH_{}_CLIENT_ID", prefix)).ok()),
        client_secret: non_empty(
            env::var(format!("SPENDSYNC_OAUTH_{}_CLIENT_SECRET", prefix)).ok(),
        ),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
