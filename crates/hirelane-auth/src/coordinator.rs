//! Single-flight token refresh.
//!
//! At most one network refresh is in flight at a time. Callers arriving
//! while a refresh runs queue a result handle and all receive the same
//! outcome, in arrival order, once the cycle completes. The cycle runs in its
//! own task so a caller dropped mid-wait cannot strand the others.
//!
//! Side effects happen before any waiter is released: on success the new
//! token is persisted, on failure the store is cleared and the session is
//! ended exactly once. There is no automatic retry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::oneshot;

use crate::api::AuthApi;
use crate::errors::RefreshError;
use crate::store::TokenStore;
use crate::validator;

/// What every waiter of a cycle receives.
pub type RefreshOutcome = Result<SecretString, RefreshError>;

/// Session-level reactions to a finished refresh cycle.
pub trait SessionSink: Send + Sync {
    /// A new token was issued and persisted.
    fn refreshed(&self, token: &SecretString);
    /// The cycle failed; the store is already cleared.
    fn expired(&self, error: &RefreshError);
}

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: TokenStore,
    sink: Arc<dyn SessionSink>,
    timeout: Duration,
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

/// Collapses concurrent refresh requests into one network call.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("refreshes", &self.refresh_count())
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create an idle coordinator.
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: TokenStore,
        sink: Arc<dyn SessionSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                sink,
                timeout,
                state: Mutex::new(RefreshState::Idle),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Join the in-flight refresh, or start one, and wait for its outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    tracing::debug!(waiters = waiters.len(), "joined in-flight refresh");
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if start {
            let inner = Arc::clone(&self.inner);
            drop(tokio::spawn(Inner::run_cycle(inner)));
        }

        rx.await.unwrap_or(Err(RefreshError::Interrupted))
    }

    /// Whether a cycle is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Callers queued on the in-flight cycle.
    pub fn waiters(&self) -> usize {
        match &*self.inner.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Network refreshes issued since creation.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::Relaxed)
    }
}

impl Inner {
    async fn run_cycle(self: Arc<Self>) {
        let mut guard = CycleGuard {
            inner: Some(Arc::clone(&self)),
        };
        let _ = self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!("refreshing access token");

        let current = self.store.get_token();
        let outcome =
            match tokio::time::timeout(self.timeout, self.api.refresh_token(current.as_ref()))
                .await
            {
                Ok(Ok(token)) if validator::decode_claims(token.expose_secret()).is_some() => {
                    Ok(token)
                }
                Ok(Ok(_)) => Err(RefreshError::Rejected(
                    "server issued a token that cannot be decoded".to_string(),
                )),
                Ok(Err(e)) => Err(RefreshError::Rejected(e.to_string())),
                Err(_) => Err(RefreshError::TimedOut(self.timeout)),
            };

        match &outcome {
            Ok(token) => {
                if let Err(e) = self.store.set_token(token.clone()) {
                    tracing::warn!(error = %e, "failed to persist refreshed token");
                }
                self.sink.refreshed(token);
                metrics::counter!("auth_refresh_total", "outcome" => "success").increment(1);
            }
            Err(e) => self.fail(e),
        }

        guard.inner = None;
        self.resolve(&outcome);
    }

    fn fail(&self, error: &RefreshError) {
        tracing::warn!(error = %error, "token refresh failed, ending session");
        if let Err(e) = self.store.clear_token() {
            tracing::warn!(error = %e, "failed to clear token store");
        }
        self.sink.expired(error);
        metrics::counter!("auth_refresh_total", "outcome" => "failure").increment(1);
    }

    fn resolve(&self, outcome: &RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        tracing::info!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "refresh cycle finished"
        );
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Ends the session and releases the waiters if the cycle task unwinds
/// before its side effects complete.
struct CycleGuard {
    inner: Option<Arc<Inner>>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let error = RefreshError::Interrupted;
            inner.fail(&error);
            inner.resolve(&Err(error));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
