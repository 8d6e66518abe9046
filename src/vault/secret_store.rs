//! OS secret-store abstraction.
//!
//! The vault prefers the operating system's secret store (Keychain,
//! Credential Manager, Secret Service) for user tokens and falls back to
//! encrypted file storage when it is unavailable. The trait keeps the vault
//! testable without a live keyring daemon.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// A named secret backend. `account` is the per-entry identifier; the backing
/// service name is fixed per store instance.
pub trait SecretStore: Send + Sync {
    /// Read a secret. `Ok(None)` means the entry does not exist; `Err` means
    /// the backend itself failed or is absent.
    fn get(&self, account: &str) -> Result<Option<String>>;

    /// Write a secret, replacing any existing value.
    fn set(&self, account: &str, secret: &str) -> Result<()>;

    /// Delete a secret. Deleting a missing entry is not an error.
    fn delete(&self, account: &str) -> Result<()>;
}

/// Secret store backed by the OS keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(&self.service, account)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, account: &str, secret: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, account)?;
        entry.set_password(secret)?;
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, account)?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory secret store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(account).cloned())
    }

    fn set(&self, account: &str, secret: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(account.to_string(), secret.to_string());
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(account);
        Ok(())
    }
}

/// Stand-in for an absent secret backend: reads find nothing, writes fail.
///
/// Used when the deployment has no usable keyring, so the vault's fallback
/// path is exercised deterministically.
pub struct DisabledStore;

impl SecretStore for DisabledStore {
    fn get(&self, _account: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, _account: &str, _secret: &str) -> Result<()> {
        Err(anyhow!("OS secret store is not available"))
    }

    fn delete(&self, _account: &str) -> Result<()> {
        Err(anyhow!("OS secret store is not available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("meta_access_token_default").unwrap(), None);

        store.set("meta_access_token_default", "tok").unwrap();
        assert_eq!(
            store.get("meta_access_token_default").unwrap(),
            Some("tok".to_string())
        );

        store.delete("meta_access_token_default").unwrap();
        assert_eq!(store.get("meta_access_token_default").unwrap(), None);
    }

    #[test]
    fn test_disabled_store() {
        let store = DisabledStore;
        assert_eq!(store.get("anything").unwrap(), None);
        assert!(store.set("anything", "tok").is_err());
        assert!(store.delete("anything").is_err());
    }
}
