//! # hirelane-settings
//!
//! Configuration with layered sources for the hirelane session core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HirelaneSettings::default()`]
//! 2. **User file**: `~/.hirelane/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HIRELANE_*` overrides (highest priority)
//!
//! Settings are loaded once by the binary and passed down explicitly; there
//! is no process-wide instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
