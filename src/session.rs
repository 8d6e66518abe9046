//! Admin session persistence.
//!
//! Admin sessions are signed state tokens with a 7-day TTL, saved to a small
//! JSON file under the data directory so a dashboard restart does not log the
//! operator out. Verification goes through the same codec as flow state.

use crate::state_token::{StateTokenCodec, ADMIN_SESSION_TTL_SECS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session file name within the data directory.
pub const ADMIN_SESSION_FILE: &str = "admin_session.json";

#[derive(Serialize, Deserialize)]
struct SessionFile {
    token: String,
    created: u64,
}

pub struct AdminSession {
    path: PathBuf,
    codec: StateTokenCodec,
}

impl AdminSession {
    pub fn new(data_dir: &Path, codec: StateTokenCodec) -> Self {
        Self {
            path: data_dir.join(ADMIN_SESSION_FILE),
            codec,
        }
    }

    /// Issue a session token for `email` and persist it.
    pub fn login(&self, email: &str) -> Result<String> {
        let token = self.codec.issue(email);
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        let contents = serde_json::to_string(&SessionFile { token: token.clone(), created })
            .context("Failed to serialize session file")?;
        fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(token)
    }

    /// Verify a presented session token, returning the admin email.
    pub fn verify(&self, token: &str) -> Option<String> {
        self.codec.verify(token, ADMIN_SESSION_TTL_SECS)
    }

    /// Resume the persisted session if one exists and is still valid.
    pub fn resume(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let file: SessionFile = serde_json::from_str(&contents).ok()?;
        self.verify(&file.token)
    }

    /// Drop the persisted session. Missing file is fine.
    pub fn logout(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("Failed to remove session file"),
        }
    }
}
