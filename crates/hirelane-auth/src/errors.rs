//! Auth error types.

use std::time::Duration;

use crate::secrets::SecretError;

/// Errors surfaced by the session core.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable token exists for an operation that needs one.
    #[error("authentication required")]
    AuthRequired,

    /// The refresh endpoint rejected the session or could not be reached.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// The server rejected the request even after a refresh and retry.
    #[error("unauthorized: the server rejected the session")]
    Unauthorized,

    /// Non-auth failure (5xx, connect error, timeout). Callers own retries.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The server answered a credential exchange with a non-2xx status.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or description.
        message: String,
    },

    /// The server issued a token whose claims cannot be decoded.
    #[error("server issued a token that cannot be decoded")]
    InvalidToken,

    /// HTTP client error outside the transient categories.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable storage I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token encryption failed.
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

impl AuthError {
    /// Whether this failure ends the session (logout + redirect to login).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RefreshFailed(_) | Self::Unauthorized)
    }

    /// Human-readable notice for terminal failures.
    pub fn user_notice(&self) -> Option<&'static str> {
        self.is_terminal().then_some(SESSION_EXPIRED_NOTICE)
    }

    /// Map a send failure: connect errors and timeouts are transient.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::TransientNetwork(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Notice shown on the login route after a forced logout.
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please sign in again.";

/// Outcome delivered to every waiter of a failed refresh cycle.
///
/// `Clone` so a single failure can fan out to all queued callers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with an error or could not be reached.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh call did not complete within the configured timeout.
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The refresh task ended without producing an outcome.
    #[error("refresh interrupted before completion")]
    Interrupted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_variants() {
        assert!(AuthError::Unauthorized.is_terminal());
        assert!(AuthError::RefreshFailed(RefreshError::Interrupted).is_terminal());
        assert!(!AuthError::TransientNetwork("502".to_string()).is_terminal());
        assert!(!AuthError::AuthRequired.is_terminal());
    }

    #[test]
    fn user_notice_only_for_terminal() {
        assert_eq!(
            AuthError::Unauthorized.user_notice(),
            Some(SESSION_EXPIRED_NOTICE)
        );
        assert!(AuthError::InvalidToken.user_notice().is_none());
    }

    #[test]
    fn refresh_failed_display_includes_cause() {
        let err = AuthError::from(RefreshError::Rejected("status 403".to_string()));
        assert_eq!(
            err.to_string(),
            "token refresh failed: refresh rejected: status 403"
        );
    }

    #[test]
    fn timed_out_display() {
        let err = RefreshError::TimedOut(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "refresh timed out after 1.5s");
    }

    #[test]
    fn rejected_display() {
        let err = AuthError::Rejected {
            status: 422,
            message: "bad email".to_string(),
        };
        assert_eq!(err.to_string(), "request rejected (422): bad email");
    }
}
