//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HirelaneSettings::default()`]
//! 2. If `~/.hirelane/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{HirelaneSettings, hirelane_dir};

/// Resolve the path to the settings file (`~/.hirelane/settings.json`).
pub fn settings_path() -> PathBuf {
    hirelane_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HirelaneSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<HirelaneSettings> {
    let defaults = serde_json::to_value(HirelaneSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HirelaneSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut HirelaneSettings) {
    if let Some(v) = read_env_string("HIRELANE_API_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = read_env_u64("HIRELANE_REFRESH_THRESHOLD_SECS", 1, 3600) {
        settings.session.refresh_threshold_secs = v;
    }
    if let Some(v) = read_env_u64("HIRELANE_REFRESH_TIMEOUT_MS", 100, 120_000) {
        settings.session.refresh_timeout_ms = v;
    }
    if let Some(v) = read_env_string("HIRELANE_STORAGE_PATH") {
        settings.session.storage_path = v;
    }
    if let Some(v) = read_env_string("HIRELANE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("HIRELANE_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject settings the session core cannot run with.
pub fn validate(settings: &HirelaneSettings) -> Result<()> {
    let base = &settings.api.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(SettingsError::InvalidValue(format!(
            "api.baseUrl must be an http(s) URL, got {base:?}"
        )));
    }
    if settings.session.refresh_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "session.refreshTimeoutMs must be greater than zero".to_string(),
        ));
    }
    for (name, route) in [
        ("routes.login", &settings.routes.login),
        ("routes.adminHome", &settings.routes.admin_home),
        ("routes.userHome", &settings.routes.user_home),
    ] {
        if !route.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "{name} must be an absolute path, got {route:?}"
            )));
        }
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
