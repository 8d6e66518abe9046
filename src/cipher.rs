//! AES-256-GCM encryption for secrets at rest.
//!
//! The cipher is keyed once per process from a base64-encoded 32-byte master
//! key. When no key is configured the cipher is "unavailable": `encrypt` and
//! `decrypt` return `None` and callers decide how to degrade. Ciphertexts are
//! stored as a single opaque string, `base64(nonce || ciphertext)`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

/// Symmetric cipher for secrets at rest.
///
/// A missing key is a supported configuration, not an error: the cipher is
/// constructed in a disabled state and every operation returns `None`.
#[derive(Clone)]
pub struct SecretCipher {
    key: Option<Vec<u8>>,
}

impl SecretCipher {
    /// Build a cipher from an optional base64-encoded master key.
    ///
    /// `None` produces a disabled cipher. A key that is present but invalid
    /// (wrong length, bad base64) is a configuration error and fails loudly.
    pub fn from_key(key_base64: Option<&str>) -> Result<Self> {
        match key_base64 {
            Some(key) => Ok(Self {
                key: Some(validate_key(key).context("Invalid encryption key")?),
            }),
            None => Ok(Self { key: None }),
        }
    }

    /// A cipher with no key; every operation returns `None`.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Whether encryption is available in this process.
    pub fn available(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    ///
    /// Returns `None` when no key is configured.
    pub fn encrypt(&self, plaintext: &str) -> Option<String> {
        let key = self.key.as_deref()?;
        let cipher = Aes256Gcm::new_from_slice(key).ok()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext.as_bytes()).ok()?;

        let mut packed = nonce.to_vec();
        packed.extend_from_slice(&ciphertext);
        Some(BASE64.encode(packed))
    }

    /// Decrypt a string produced by [`encrypt`](Self::encrypt).
    ///
    /// Returns `None` when no key is configured, when the input is malformed,
    /// or when authentication fails (wrong key or tampered data). Never
    /// returns corrupted plaintext.
    pub fn decrypt(&self, encoded: &str) -> Option<String> {
        let key = self.key.as_deref()?;
        let packed = BASE64.decode(encoded).ok()?;
        if packed.len() < NONCE_SIZE {
            return None;
        }
        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(key).ok()?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}
