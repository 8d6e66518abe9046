//! Ad platform identifiers.
//!
//! Each platform selects an adapter, a credential namespace in the vault,
//! and a set of environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported ad platforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Google,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Meta, Platform::Google, Platform::TikTok];

    /// Lowercase key used for metadata entries and keyring accounts.
    pub fn key(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
            Platform::TikTok => "tiktok",
        }
    }

    /// Display label used in normalized spend rows.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Meta => "Meta",
            Platform::Google => "Google",
            Platform::TikTok => "TikTok",
        }
    }

    /// Uppercase prefix for environment variables (e.g. `SPENDSYNC_OAUTH_META_CLIENT_ID`).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Platform::Meta => "META",
            Platform::Google => "GOOGLE",
            Platform::TikTok => "TIKTOK",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Unrecognized platform name.
#[derive(Debug, PartialEq)]
pub struct UnknownPlatform(pub String);

impl fmt::Display for UnknownPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown platform '{}'", self.0)
    }
}

impl std::error::Error for UnknownPlatform {}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    /// Parses a platform name, accepting the aliases providers and older
    /// clients use (`facebook`, `google_ads`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "meta" | "facebook" => Ok(Platform::Meta),
            "google" | "google_ads" => Ok(Platform::Google),
            "tiktok" => Ok(Platform::TikTok),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}
