//! File-backed connector metadata.
//!
//! One JSON document keyed by platform name holds everything that is not a
//! user token in the OS secret store: app registration, encrypted token
//! fallbacks, email-to-ad-account mappings, and the last sync timestamp.
//!
//! Writes are whole-file read-merge-write with no locking. Concurrent flows
//! for different platforms touch disjoint keys; two concurrent writes for the
//! same platform race and the last writer wins. Accepted for the
//! single-operator deployment this serves.

use crate::platform::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Metadata file name within the data directory.
pub const METADATA_FILE: &str = "connectors.json";

/// Per-platform metadata entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlatformMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret encrypted by the process cipher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_enc: Option<String>,

    /// Plaintext client secret. Written only after the explicit consent gate;
    /// cleared whenever an encrypted secret is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Encrypted user tokens keyed by user key (file fallback only; tokens in
    /// the OS secret store never appear here).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,

    /// Email -> external ad account id, maintained by admins.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub email_ad_accounts: BTreeMap<String, String>,

    /// Platform-level ad account id, used when no per-email mapping applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_account_id: Option<String>,

    /// RFC 3339 timestamp of the last successful spend sync.
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// Whole-file JSON store for [`PlatformMeta`] entries.
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(METADATA_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load one platform's entry. `None` when the file or the entry is
    /// missing. A corrupt file is treated as empty (and logged), matching the
    /// store's merge behavior.
    pub fn load(&self, platform: Platform) -> Option<PlatformMeta> {
        self.read_all().remove(platform.key())
    }

    /// Read-merge-write one platform's entry. `apply` mutates the existing
    /// entry (or a default one); all other platforms and all fields the
    /// closure does not touch survive unchanged.
    pub fn merge(&self, platform: Platform, apply: impl FnOnce(&mut PlatformMeta)) -> Result<()> {
        let mut all = self.read_all();
        let entry = all.entry(platform.key().to_string()).or_default();
        apply(entry);
        self.write_all(&all)
    }

    fn read_all(&self) -> BTreeMap<String, PlatformMeta> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&contents) {
            Ok(all) => all,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Corrupt metadata file, starting empty");
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, all: &BTreeMap<String, PlatformMeta>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        let contents =
            serde_json::to_string_pretty(all).context("Failed to serialize metadata")?;
        fs::write(&self.path, contents).context("Failed to write metadata file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(store.load(Platform::Meta).is_none());
    }

    #[test]
    fn test_merge_creates_and_updates() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store
            .merge(Platform::Meta, |meta| {
                meta.client_id = Some("app-123".to_string());
            })
            .unwrap();

        let meta = store.load(Platform::Meta).unwrap();
        assert_eq!(meta.client_id.as_deref(), Some("app-123"));
        assert!(meta.last_sync.is_none());
    }

    #[test]
    fn test_merge_preserves_unrelated_fields() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store
            .merge(Platform::Google, |meta| {
                meta.tokens
                    .insert("alice@example.com".to_string(), "enc-token".to_string());
                meta.email_ad_accounts
                    .insert("alice@example.com".to_string(), "123-456".to_string());
                meta.last_sync = Some("2025-01-01T00:00:00Z".to_string());
            })
            .unwrap();

        // A credential update must not clobber tokens, mappings, or last_sync
        store
            .merge(Platform::Google, |meta| {
                meta.client_id = Some("new-client".to_string());
            })
            .unwrap();

        let meta = store.load(Platform::Google).unwrap();
        assert_eq!(meta.client_id.as_deref(), Some("new-client"));
        assert_eq!(meta.tokens.get("alice@example.com").unwrap(), "enc-token");
        assert_eq!(
            meta.email_ad_accounts.get("alice@example.com").unwrap(),
            "123-456"
        );
        assert_eq!(meta.last_sync.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_merge_preserves_other_platforms() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        store
            .merge(Platform::Meta, |meta| {
                meta.client_id = Some("meta-app".to_string());
            })
            .unwrap();
        store
            .merge(Platform::TikTok, |meta| {
                meta.client_id = Some("tiktok-app".to_string());
            })
            .unwrap();

        assert_eq!(
            store.load(Platform::Meta).unwrap().client_id.as_deref(),
            Some("meta-app")
        );
        assert_eq!(
            store.load(Platform::TikTok).unwrap().client_id.as_deref(),
            Some("tiktok-app")
        );
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load(Platform::Meta).is_none());
        store
            .merge(Platform::Meta, |meta| {
                meta.client_id = Some("recovered".to_string());
            })
            .unwrap();
        assert_eq!(
            store.load(Platform::Meta).unwrap().client_id.as_deref(),
            Some("recovered")
        );
    }
}
