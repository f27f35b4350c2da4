//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Types marked `#[serde(default)]`
//! accept partial JSON: missing fields get their default during
//! deserialization.

mod api;
mod routes;
mod session;

pub use api::*;
pub use routes::*;
pub use session::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// Loaded from `~/.hirelane/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "api": { "baseUrl": "https://jobs.example.com/api" },
///   "session": { "refreshThresholdSecs": 120 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HirelaneSettings {
    /// Remote API endpoint settings.
    pub api: ApiSettings,
    /// Token storage and refresh behavior.
    pub session: SessionSettings,
    /// Routes used by the session guard.
    pub routes: RouteSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Base directory for hirelane state (`~/.hirelane`).
pub fn hirelane_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hirelane")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
