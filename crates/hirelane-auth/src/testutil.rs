//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use crate::api::AuthApi;
use crate::coordinator::{RefreshCoordinator, SessionSink};
use crate::errors::{AuthError, RefreshError};

/// Unsigned JWT carrying `exp` and an optional role.
pub(crate) fn make_jwt(exp: i64, role: Option<&str>) -> String {
    let payload = match role {
        Some(role) => serde_json::json!({ "exp": exp, "sub": "user-1", "role": role }),
        None => serde_json::json!({ "exp": exp, "sub": "user-1" }),
    };
    jwt_with_payload(&payload.to_string())
}

/// JWT with an arbitrary payload segment.
pub(crate) fn jwt_with_payload(payload: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload);
    format!("{header}.{body}.signature")
}

/// Yield until `n` callers are queued on the coordinator.
pub(crate) async fn wait_for_waiters(coordinator: &RefreshCoordinator, n: usize) {
    while coordinator.waiters() < n {
        tokio::task::yield_now().await;
    }
}

enum RefreshScript {
    Issue(String),
    Reject,
    Hang,
    Panic,
}

/// Scripted [`AuthApi`] that counts calls.
pub(crate) struct MockAuthApi {
    script: RefreshScript,
    gated: AtomicBool,
    gate: Notify,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    login_token: Mutex<Option<String>>,
    last_proof: Mutex<Option<String>>,
}

impl MockAuthApi {
    fn with_script(script: RefreshScript) -> Self {
        Self {
            script,
            gated: AtomicBool::new(false),
            gate: Notify::new(),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            login_token: Mutex::new(None),
            last_proof: Mutex::new(None),
        }
    }

    pub(crate) fn issuing(token: &str) -> Self {
        Self::with_script(RefreshScript::Issue(token.to_string()))
    }

    pub(crate) fn rejecting() -> Self {
        Self::with_script(RefreshScript::Reject)
    }

    pub(crate) fn hanging() -> Self {
        Self::with_script(RefreshScript::Hang)
    }

    pub(crate) fn panicking() -> Self {
        Self::with_script(RefreshScript::Panic)
    }

    /// Hold refresh calls until [`Self::release`].
    pub(crate) fn gated(self) -> Self {
        self.gated.store(true, Ordering::SeqCst);
        self
    }

    /// Accept logins, issuing `token`.
    pub(crate) fn with_login(self, token: &str) -> Self {
        *self.login_token.lock() = Some(token.to_string());
        self
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_proof(&self) -> Option<String> {
        self.last_proof.lock().clone()
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _email: &str, password: &SecretString) -> Result<SecretString, AuthError> {
        let issued = self.login_token.lock().clone();
        match issued {
            Some(token) if password.expose_secret() == "correct" => Ok(SecretString::from(token)),
            _ => Err(AuthError::Unauthorized),
        }
    }

    async fn refresh_token(
        &self,
        current: Option<&SecretString>,
    ) -> Result<SecretString, AuthError> {
        let _ = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_proof.lock() = current.map(|t| t.expose_secret().to_string());
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        match &self.script {
            RefreshScript::Issue(token) => Ok(SecretString::from(token.clone())),
            RefreshScript::Reject => Err(AuthError::Rejected {
                status: 401,
                message: "refresh session expired".to_string(),
            }),
            RefreshScript::Hang => std::future::pending().await,
            RefreshScript::Panic => panic!("refresh backend crashed"),
        }
    }

    async fn logout(&self, _current: Option<&SecretString>) -> Result<(), AuthError> {
        let _ = self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`SessionSink`] that records what it was told.
#[derive(Default)]
pub(crate) struct RecordingSink {
    refreshed: AtomicUsize,
    expired: Mutex<Vec<RefreshError>>,
}

impl RecordingSink {
    pub(crate) fn refreshed_count(&self) -> usize {
        self.refreshed.load(Ordering::SeqCst)
    }

    pub(crate) fn expired_errors(&self) -> Vec<RefreshError> {
        self.expired.lock().clone()
    }
}

impl SessionSink for RecordingSink {
    fn refreshed(&self, _token: &SecretString) {
        let _ = self.refreshed.fetch_add(1, Ordering::SeqCst);
    }

    fn expired(&self, error: &RefreshError) {
        self.expired.lock().push(error.clone());
    }
}
