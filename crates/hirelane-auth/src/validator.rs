//! Local access-token validation.
//!
//! Tokens are JWTs. Only the payload is inspected: the client cannot verify
//! the signature and the server stays the authority on acceptance. Every
//! function here is pure apart from reading the clock, and each has an `_at`
//! variant taking an explicit `now`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims the session core reads from a token payload.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Subject (user id).
    #[serde(default)]
    pub sub: Option<String>,
    /// Role name.
    #[serde(default)]
    pub role: Option<String>,
    /// Explicit admin flag.
    #[serde(default)]
    pub is_admin: Option<bool>,
}

impl TokenClaims {
    /// Whether the token grants admin access.
    pub fn is_admin(&self) -> bool {
        self.is_admin == Some(true)
            || self
                .role
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case("admin"))
    }

    /// Expiry as a timestamp, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Decode the payload segment of a JWT. `None` for anything malformed.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry of `token`, if it decodes.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token)?.expires_at()
}

/// Whether `token` decodes and has not yet expired.
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, Utc::now())
}

/// [`is_valid`] against an explicit clock. A token expiring exactly at `now`
/// is already expired.
pub fn is_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    decode_claims(token).is_some_and(|c| c.exp > now.timestamp())
}

/// Whether `token` expires within `threshold_secs`. Undecodable tokens count
/// as expiring.
pub fn will_expire_soon(token: &str, threshold_secs: u64) -> bool {
    will_expire_soon_at(token, threshold_secs, Utc::now())
}

/// [`will_expire_soon`] against an explicit clock.
pub fn will_expire_soon_at(token: &str, threshold_secs: u64, now: DateTime<Utc>) -> bool {
    let Some(claims) = decode_claims(token) else {
        return true;
    };
    let threshold = i64::try_from(threshold_secs).unwrap_or(i64::MAX);
    claims.exp <= now.timestamp().saturating_add(threshold)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
