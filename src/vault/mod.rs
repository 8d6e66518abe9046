//! Tiered credential vault.
//!
//! Persists per-platform, per-user secrets behind one interface regardless of
//! backend. User tokens prefer the OS secret store and fall back to the
//! encrypted metadata file; they are never written in plaintext. App
//! credentials (client id/secret) live in the metadata file, with the client
//! secret encrypted whenever the process cipher is available and stored in
//! plaintext only after an explicit consent gate.
//!
//! # Storage resolution
//!
//! ```text
//! store:    OS secret store ──(write error)──> cipher + metadata file ──(no cipher)──> failure
//! retrieve: OS secret store ──(absent)──────> metadata file + decrypt ──(absent)────> none
//! ```

pub mod metadata;
pub mod secret_store;

pub use metadata::{MetadataStore, PlatformMeta, METADATA_FILE};
pub use secret_store::{DisabledStore, KeyringStore, MemoryStore, SecretStore};

use crate::cipher::SecretCipher;
use crate::platform::Platform;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// User key used when no identity was resolved for a flow.
pub const DEFAULT_USER_KEY: &str = "default";

/// Where a token for a `(platform, user)` pair currently lives. Computed by
/// probing backends in priority order, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    Keyring,
    EncryptedFile,
    None,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageLocation::Keyring => "keyring",
            StorageLocation::EncryptedFile => "encrypted_file",
            StorageLocation::None => "none",
        };
        f.write_str(s)
    }
}

/// Per-platform app registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Whether the caller has confirmed storing an app secret in plaintext.
/// Session-scoped: granted once per admin session, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaintextConsent {
    Granted,
    Withheld,
}

/// Vault operation failures.
#[derive(Debug)]
pub enum VaultError {
    /// No cipher key configured and the secret store rejected the write;
    /// user tokens are never stored in plaintext.
    CipherUnavailable,
    /// Plaintext app-secret storage requires explicit consent.
    PlaintextRefused,
    /// Migration requested but no file-stored token exists.
    NothingToMigrate,
    /// The OS secret store failed.
    SecretStore(String),
    /// The metadata file could not be read or written.
    Storage(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::CipherUnavailable => write!(
                f,
                "no encryption key configured; refusing to store the secret unprotected"
            ),
            VaultError::PlaintextRefused => write!(
                f,
                "plaintext secret storage requires explicit confirmation"
            ),
            VaultError::NothingToMigrate => write!(f, "no file-stored token to migrate"),
            VaultError::SecretStore(msg) => write!(f, "secret store error: {}", msg),
            VaultError::Storage(msg) => write!(f, "metadata storage error: {}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

/// One admin-visible mapping row.
#[derive(Clone, Debug, Serialize)]
pub struct MappingEntry {
    pub email: String,
    pub account_id: String,
    pub token_storage: StorageLocation,
}

/// Tiered secret storage for all platforms.
pub struct CredentialVault {
    metadata: MetadataStore,
    cipher: SecretCipher,
    secrets: Box<dyn SecretStore>,
}

impl CredentialVault {
    pub fn new(data_dir: &Path, cipher: SecretCipher, secrets: Box<dyn SecretStore>) -> Self {
        Self {
            metadata: MetadataStore::new(data_dir),
            cipher,
            secrets,
        }
    }

    fn account_name(platform: Platform, user_key: &str) -> String {
        format!("{}_access_token_{}", platform.key(), user_key)
    }

    fn user_key(user: Option<&str>) -> &str {
        user.unwrap_or(DEFAULT_USER_KEY)
    }

    /// Store a user token, preferring the OS secret store.
    ///
    /// On secret-store failure the token is encrypted into the metadata file.
    /// With no cipher available the operation fails: unlike app credentials,
    /// user tokens have no plaintext fallback.
    pub fn store_token(
        &self,
        platform: Platform,
        user: Option<&str>,
        token: &str,
    ) -> Result<StorageLocation, VaultError> {
        let user_key = Self::user_key(user);
        let account = Self::account_name(platform, user_key);

        match self.secrets.set(&account, token) {
            Ok(()) => {
                // Keep the metadata entry alive for ad-account settings and
                // last_sync; the token itself stays out of the file.
                self.metadata
                    .merge(platform, |_| {})
                    .map_err(|e| VaultError::Storage(e.to_string()))?;
                info!(platform = %platform, user = %user_key, "Stored token in OS secret store");
                Ok(StorageLocation::Keyring)
            }
            Err(err) => {
                warn!(
                    platform = %platform,
                    user = %user_key,
                    error = %err,
                    "Secret store write failed, falling back to encrypted file"
                );
                let encrypted = self
                    .cipher
                    .encrypt(token)
                    .ok_or(VaultError::CipherUnavailable)?;
                self.metadata
                    .merge(platform, |meta| {
                        meta.tokens.insert(user_key.to_string(), encrypted);
                    })
                    .map_err(|e| VaultError::Storage(e.to_string()))?;
                info!(platform = %platform, user = %user_key, "Stored token in encrypted file");
                Ok(StorageLocation::EncryptedFile)
            }
        }
    }

    /// Retrieve a user token from whichever backend holds it.
    pub fn retrieve_token(&self, platform: Platform, user: Option<&str>) -> Option<String> {
        let user_key = Self::user_key(user);
        let account = Self::account_name(platform, user_key);

        if let Ok(Some(token)) = self.secrets.get(&account) {
            return Some(token);
        }

        let meta = self.metadata.load(platform)?;
        let encrypted = meta.tokens.get(user_key)?;
        self.cipher.decrypt(encrypted)
    }

    /// Probe where a token lives without decrypting anything.
    pub fn locate_token(&self, platform: Platform, user: Option<&str>) -> StorageLocation {
        let user_key = Self::user_key(user);
        let account = Self::account_name(platform, user_key);

        if let Ok(Some(_)) = self.secrets.get(&account) {
            return StorageLocation::Keyring;
        }
        if let Some(meta) = self.metadata.load(platform) {
            if meta.tokens.contains_key(user_key) {
                return StorageLocation::EncryptedFile;
            }
        }
        StorageLocation::None
    }

    /// Move a file-stored token into the OS secret store and delete the file
    /// copy, so exactly one authoritative copy remains. Fails without side
    /// effects when there is nothing to migrate or the secret store is
    /// unusable.
    pub fn migrate_to_keyring(
        &self,
        platform: Platform,
        user: Option<&str>,
    ) -> Result<(), VaultError> {
        let user_key = Self::user_key(user);

        let encrypted = self
            .metadata
            .load(platform)
            .and_then(|meta| meta.tokens.get(user_key).cloned())
            .ok_or(VaultError::NothingToMigrate)?;
        let token = self
            .cipher
            .decrypt(&encrypted)
            .ok_or(VaultError::CipherUnavailable)?;

        let account = Self::account_name(platform, user_key);
        self.secrets
            .set(&account, &token)
            .map_err(|e| VaultError::SecretStore(e.to_string()))?;

        self.metadata
            .merge(platform, |meta| {
                meta.tokens.remove(user_key);
            })
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        info!(platform = %platform, user = %user_key, "Migrated token to OS secret store");
        Ok(())
    }

    /// Store an app registration, merging into existing platform metadata so
    /// tokens, mappings, and `last_sync` survive. The client secret is
    /// encrypted when possible; plaintext requires [`PlaintextConsent::Granted`].
    pub fn store_credential(
        &self,
        platform: Platform,
        record: &CredentialRecord,
        consent: PlaintextConsent,
    ) -> Result<(), VaultError> {
        let encrypted = self.cipher.encrypt(&record.client_secret);
        if encrypted.is_none() && consent == PlaintextConsent::Withheld {
            return Err(VaultError::PlaintextRefused);
        }

        if encrypted.is_none() {
            warn!(platform = %platform, "Storing app client secret in plaintext (confirmed by operator)");
        }

        self.metadata
            .merge(platform, |meta| {
                meta.client_id = Some(record.client_id.clone());
                meta.redirect_uri = Some(record.redirect_uri.clone());
                match &encrypted {
                    Some(enc) => {
                        meta.client_secret_enc = Some(enc.clone());
                        meta.client_secret = None;
                    }
                    None => {
                        meta.client_secret = Some(record.client_secret.clone());
                        meta.client_secret_enc = None;
                    }
                }
            })
            .map_err(|e| VaultError::Storage(e.to_string()))
    }

    /// Load an app registration, decrypting the client secret when stored
    /// encrypted. `None` when no usable registration exists.
    pub fn load_credential(&self, platform: Platform) -> Option<CredentialRecord> {
        let meta = self.metadata.load(platform)?;
        let client_id = meta.client_id?;
        let client_secret = match &meta.client_secret_enc {
            Some(enc) => self.cipher.decrypt(enc).or(meta.client_secret),
            None => meta.client_secret,
        }?;
        Some(CredentialRecord {
            client_id,
            client_secret,
            redirect_uri: meta.redirect_uri.unwrap_or_default(),
        })
    }

    /// Remove an app registration, leaving tokens and mappings in place.
    /// Returns whether anything was removed.
    pub fn delete_credential(&self, platform: Platform) -> Result<bool, VaultError> {
        let had_credential = self
            .metadata
            .load(platform)
            .map(|meta| {
                meta.client_id.is_some()
                    || meta.client_secret.is_some()
                    || meta.client_secret_enc.is_some()
            })
            .unwrap_or(false);
        if !had_credential {
            return Ok(false);
        }
        self.metadata
            .merge(platform, |meta| {
                meta.client_id = None;
                meta.client_secret = None;
                meta.client_secret_enc = None;
                meta.redirect_uri = None;
            })
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(true)
    }

    /// Add or update an email -> ad account mapping.
    pub fn set_account_mapping(
        &self,
        platform: Platform,
        email: &str,
        account_id: &str,
    ) -> Result<(), VaultError> {
        self.metadata
            .merge(platform, |meta| {
                meta.email_ad_accounts
                    .insert(email.to_string(), account_id.to_string());
            })
            .map_err(|e| VaultError::Storage(e.to_string()))
    }

    /// Remove a mapping; returns whether it existed.
    pub fn remove_account_mapping(
        &self,
        platform: Platform,
        email: &str,
    ) -> Result<bool, VaultError> {
        let existed = self
            .metadata
            .load(platform)
            .map(|meta| meta.email_ad_accounts.contains_key(email))
            .unwrap_or(false);
        if !existed {
            return Ok(false);
        }
        self.metadata
            .merge(platform, |meta| {
                meta.email_ad_accounts.remove(email);
            })
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(true)
    }

    /// Admin listing of mappings with each user's token storage location.
    pub fn list_mappings(&self, platform: Platform) -> Vec<MappingEntry> {
        let mappings: BTreeMap<String, String> = self
            .metadata
            .load(platform)
            .map(|meta| meta.email_ad_accounts)
            .unwrap_or_default();
        mappings
            .into_iter()
            .map(|(email, account_id)| {
                let token_storage = self.locate_token(platform, Some(&email));
                MappingEntry {
                    email,
                    account_id,
                    token_storage,
                }
            })
            .collect()
    }

    /// Resolve which external ad account a user's spend should come from:
    /// environment override, then per-email mapping, then the platform-level
    /// account id.
    pub fn account_for(&self, platform: Platform, user: Option<&str>) -> Option<String> {
        let env_var = format!("SPENDSYNC_{}_AD_ACCOUNT_ID", platform.env_prefix());
        if let Ok(account) = std::env::var(&env_var) {
            if !account.is_empty() {
                return Some(account);
            }
        }

        let meta = self.metadata.load(platform)?;
        if let Some(email) = user {
            if let Some(account) = meta.email_ad_accounts.get(email) {
                return Some(account.clone());
            }
        }
        meta.ad_account_id
    }

    /// Record a successful sync against the platform metadata.
    pub fn update_last_sync(&self, platform: Platform) -> Result<(), VaultError> {
        self.metadata
            .merge(platform, |meta| {
                meta.last_sync = Some(Utc::now().to_rfc3339());
            })
            .map_err(|e| VaultError::Storage(e.to_string()))
    }

    /// Timestamp of the last successful sync, if any.
    pub fn last_sync(&self, platform: Platform) -> Option<String> {
        self.metadata.load(platform).and_then(|meta| meta.last_sync)
    }
}
