//! Token storage and refresh settings.

use serde::{Deserialize, Serialize};

use super::hirelane_dir;

/// Session persistence and refresh behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Refresh proactively when the token expires within this many seconds.
    pub refresh_threshold_secs: u64,
    /// Upper bound on a single refresh call, in milliseconds.
    pub refresh_timeout_ms: u64,
    /// Durable storage file holding the encrypted token.
    pub storage_path: String,
    /// Key file used to encrypt the stored token.
    pub key_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let dir = hirelane_dir();
        Self {
            refresh_threshold_secs: 60,
            refresh_timeout_ms: 10_000,
            storage_path: dir.join("session.json").to_string_lossy().into_owned(),
            key_path: dir.join("session.key").to_string_lossy().into_owned(),
        }
    }
}
