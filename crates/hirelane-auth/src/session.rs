//! Session state and the actions that change it.
//!
//! [`SessionState`] is an explicitly constructed container handed to every
//! component that needs it; there is no process-wide session. The only
//! writers are [`SessionManager`] and [`SessionEffects`], which the refresh
//! coordinator and the response interceptor reach through the
//! [`SessionSink`] seam.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hirelane_settings::{HirelaneSettings, RouteSettings};
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};

use crate::api::AuthApi;
use crate::coordinator::{RefreshCoordinator, SessionSink};
use crate::errors::{AuthError, RefreshError, SESSION_EXPIRED_NOTICE};
use crate::store::TokenStore;
use crate::validator::{self, TokenClaims};

/// The three flags the route guard reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// The initial session check has completed.
    pub is_initialized: bool,
    /// A usable token is held.
    pub is_authenticated: bool,
    /// The token carries admin rights.
    pub is_admin: bool,
}

/// Point-in-time view of the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Expiry of the current token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Subject of the current token.
    pub user_id: Option<String>,
    /// A usable token is held.
    pub is_authenticated: bool,
    /// The token carries admin rights.
    pub is_admin: bool,
    /// The initial session check has completed.
    pub is_initialized: bool,
}

impl SessionSnapshot {
    /// Guard-facing flags as of now.
    pub fn flags(&self) -> SessionFlags {
        self.flags_at(Utc::now())
    }

    /// Guard-facing flags as of `now`.
    ///
    /// A token past its expiry no longer authenticates, whatever was
    /// recorded when it was established.
    pub fn flags_at(&self, now: DateTime<Utc>) -> SessionFlags {
        let live = self.is_authenticated && self.expires_at.is_some_and(|exp| exp > now);
        SessionFlags {
            is_initialized: self.is_initialized,
            is_authenticated: live,
            is_admin: live && self.is_admin,
        }
    }
}

/// Shared, injectable session state. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SessionState {
    /// Fresh, uninitialized, signed-out state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state, with an expired token reported as
    /// signed out.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.inner.read().clone();
        let flags = snapshot.flags();
        snapshot.is_authenticated = flags.is_authenticated;
        snapshot.is_admin = flags.is_admin;
        snapshot
    }

    /// Guard-facing flags as of now.
    pub fn flags(&self) -> SessionFlags {
        self.inner.read().flags()
    }

    /// Guard-facing flags as of `now`.
    pub fn flags_at(&self, now: DateTime<Utc>) -> SessionFlags {
        self.inner.read().flags_at(now)
    }

    /// Mark authenticated from the claims of a freshly stored token.
    pub fn establish(&self, claims: &TokenClaims) {
        let mut s = self.inner.write();
        s.expires_at = claims.expires_at();
        s.user_id.clone_from(&claims.sub);
        s.is_authenticated = true;
        s.is_admin = claims.is_admin();
    }

    /// Drop authentication. `is_initialized` is kept.
    pub fn clear(&self) {
        let mut s = self.inner.write();
        s.expires_at = None;
        s.user_id = None;
        s.is_authenticated = false;
        s.is_admin = false;
    }

    /// Record that the initial session check has completed.
    pub fn mark_initialized(&self) {
        self.inner.write().is_initialized = true;
    }
}

/// Navigation port. Implemented by whatever owns routing.
pub trait Navigator: Send + Sync {
    /// Go to `route`, showing `notice` there if given.
    fn redirect(&self, route: &str, notice: Option<&str>);
}

/// Navigator that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect(&self, route: &str, _notice: Option<&str>) {
        tracing::debug!(route, "redirect requested");
    }
}

/// Navigator that records every redirect.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingNavigator {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirects so far, oldest first.
    pub fn redirects(&self) -> Vec<(String, Option<String>)> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str, notice: Option<&str>) {
        self.redirects
            .lock()
            .push((route.to_string(), notice.map(str::to_string)));
    }
}

/// Session-ending side effects shared by the coordinator, the response
/// interceptor and the manager.
pub struct SessionEffects {
    state: SessionState,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    login_route: String,
}

impl std::fmt::Debug for SessionEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEffects")
            .field("state", &self.state)
            .field("login_route", &self.login_route)
            .finish_non_exhaustive()
    }
}

impl SessionEffects {
    /// Bundle the pieces a forced logout touches.
    pub fn new(
        state: SessionState,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            state,
            store,
            navigator,
            login_route: login_route.into(),
        }
    }

    /// Forced logout: clear the store and the flags, then send the viewer to
    /// the login route with the expiry notice.
    pub fn expire(&self) {
        if let Err(e) = self.store.clear_token() {
            tracing::warn!(error = %e, "failed to clear token store");
        }
        self.end_session(Some(SESSION_EXPIRED_NOTICE));
    }

    fn end_session(&self, notice: Option<&str>) {
        self.state.clear();
        tracing::info!(route = %self.login_route, "session ended");
        self.navigator.redirect(&self.login_route, notice);
    }
}

impl SessionSink for SessionEffects {
    fn refreshed(&self, token: &SecretString) {
        match validator::decode_claims(token.expose_secret()) {
            Some(claims) => self.state.establish(&claims),
            None => self.state.clear(),
        }
    }

    fn expired(&self, error: &RefreshError) {
        tracing::debug!(%error, "refresh failure ends session");
        self.end_session(Some(SESSION_EXPIRED_NOTICE));
    }
}

/// Tunables for the session core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Refresh before a request when the token expires within this window.
    pub refresh_threshold_secs: u64,
    /// Upper bound on one refresh call.
    pub refresh_timeout: Duration,
    /// Guard and redirect targets.
    pub routes: RouteSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&HirelaneSettings::default())
    }
}

impl SessionConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &HirelaneSettings) -> Self {
        Self {
            refresh_threshold_secs: settings.session.refresh_threshold_secs,
            refresh_timeout: Duration::from_millis(settings.session.refresh_timeout_ms),
            routes: settings.routes.clone(),
        }
    }
}

/// Owns the session lifecycle: startup check, login, logout, forced expiry.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: TokenStore,
    state: SessionState,
    effects: Arc<SessionEffects>,
    coordinator: RefreshCoordinator,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state)
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Wire a manager, its state and its refresh coordinator together.
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
        config: SessionConfig,
    ) -> Self {
        let state = SessionState::new();
        let effects = Arc::new(SessionEffects::new(
            state.clone(),
            store.clone(),
            navigator,
            config.routes.login.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&api),
            store.clone(),
            effects.clone(),
            config.refresh_timeout,
        );
        Self {
            api,
            store,
            state,
            effects,
            coordinator,
            config,
        }
    }

    /// Shared session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The token store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// The refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Forced-logout effects.
    pub fn effects(&self) -> &Arc<SessionEffects> {
        &self.effects
    }

    /// Active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Startup check. A valid stored token establishes the session, an
    /// expired one gets a single refresh attempt, anything else signs out.
    #[tracing::instrument(skip_all)]
    pub async fn initialize(&self) -> SessionFlags {
        match self.store.get_token() {
            None => self.state.clear(),
            Some(token) => {
                let token = token.expose_secret();
                match validator::decode_claims(token) {
                    Some(claims) if validator::is_valid(token) => self.state.establish(&claims),
                    Some(_) => {
                        tracing::info!("stored token expired, attempting refresh");
                        if let Err(e) = self.coordinator.refresh().await {
                            tracing::info!(error = %e, "session could not be restored");
                        }
                    }
                    None => {
                        tracing::warn!("stored token cannot be decoded, signing out");
                        if let Err(e) = self.store.clear_token() {
                            tracing::warn!(error = %e, "failed to clear token store");
                        }
                        self.state.clear();
                    }
                }
            }
        }
        self.state.mark_initialized();
        let flags = self.state.flags();
        tracing::info!(
            authenticated = flags.is_authenticated,
            admin = flags.is_admin,
            "session initialized"
        );
        flags
    }

    /// Exchange credentials for a token and establish the session.
    ///
    /// On failure the session is left as it was.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<SessionFlags, AuthError> {
        let token = self.api.login(email, password).await?;
        let claims =
            validator::decode_claims(token.expose_secret()).ok_or(AuthError::InvalidToken)?;
        if !validator::is_valid(token.expose_secret()) {
            tracing::warn!("server issued an already expired token");
            return Err(AuthError::InvalidToken);
        }
        self.store.set_token(token)?;
        self.state.establish(&claims);
        self.state.mark_initialized();
        tracing::info!(admin = claims.is_admin(), "logged in");
        Ok(self.state.flags())
    }

    /// Voluntary logout. The server call is best-effort; the in-memory
    /// session is always cleared and the login redirect always happens.
    ///
    /// Returns the storage error, after redirecting, if the durable copy
    /// could not be removed.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), AuthError> {
        let current = self.store.get_token();
        if let Err(e) = self.api.logout(current.as_ref()).await {
            tracing::warn!(error = %e, "server logout failed");
        }
        self.state.clear();
        let cleared = self.store.clear_token();
        if let Err(e) = &cleared {
            tracing::warn!(error = %e, "failed to clear token store");
        }
        tracing::info!("logged out");
        self.effects
            .navigator
            .redirect(&self.config.routes.login, None);
        cleared
    }

    /// Forced logout with the expiry notice.
    pub fn expire(&self) {
        self.effects.expire();
    }

    /// The stored token, if it has not expired.
    pub fn access_token(&self) -> Result<SecretString, AuthError> {
        self.store
            .get_token()
            .filter(|t| validator::is_valid(t.expose_secret()))
            .ok_or(AuthError::AuthRequired)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{GuardDecision, RouteAccess, SessionGuard};
    use crate::secrets;
    use crate::store::{MemoryStorage, StorageBackend};
    use crate::testutil::{MockAuthApi, make_jwt};
    use assert_matches::assert_matches;

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Backend on a volume that refuses deletes.
    struct UndeletableStorage(MemoryStorage);

    impl StorageBackend for UndeletableStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
            self.0.set(key, value)
        }

        fn remove(&self, _key: &str) -> Result<(), AuthError> {
            Err(AuthError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )))
        }
    }

    struct Fixture {
        api: Arc<MockAuthApi>,
        navigator: Arc<RecordingNavigator>,
        manager: SessionManager,
    }

    fn fixture(api: MockAuthApi) -> Fixture {
        let api = Arc::new(api);
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionManager::new(
            api.clone(),
            TokenStore::in_memory(),
            navigator.clone(),
            SessionConfig::default(),
        );
        Fixture {
            api,
            navigator,
            manager,
        }
    }

    #[tokio::test]
    async fn initialize_without_token() {
        let f = fixture(MockAuthApi::rejecting());
        let flags = f.manager.initialize().await;
        assert_eq!(
            flags,
            SessionFlags {
                is_initialized: true,
                is_authenticated: false,
                is_admin: false,
            }
        );
        assert_eq!(f.api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn initialize_with_valid_token() {
        let f = fixture(MockAuthApi::rejecting());
        f.manager
            .store()
            .set_token(SecretString::from(make_jwt(now() + 600, Some("admin"))))
            .unwrap();

        let flags = f.manager.initialize().await;
        assert!(flags.is_initialized && flags.is_authenticated && flags.is_admin);
        assert_eq!(f.api.refresh_calls(), 0);
        assert_eq!(
            f.manager.state().snapshot().user_id.as_deref(),
            Some("user-1")
        );
    }

    #[tokio::test]
    async fn initialize_refreshes_expired_token() {
        let fresh = make_jwt(now() + 600, Some("user"));
        let f = fixture(MockAuthApi::issuing(&fresh));
        f.manager
            .store()
            .set_token(SecretString::from(make_jwt(now() - 5, None)))
            .unwrap();

        let flags = f.manager.initialize().await;
        assert!(flags.is_authenticated);
        assert!(!flags.is_admin);
        assert_eq!(f.api.refresh_calls(), 1);
        assert_eq!(f.manager.store().get_token().unwrap().expose_secret(), fresh);
    }

    #[tokio::test]
    async fn initialize_failed_refresh_signs_out() {
        let f = fixture(MockAuthApi::rejecting());
        f.manager
            .store()
            .set_token(SecretString::from(make_jwt(now() - 5, None)))
            .unwrap();

        let flags = f.manager.initialize().await;
        assert!(flags.is_initialized);
        assert!(!flags.is_authenticated);
        assert!(f.manager.store().get_token().is_none());
        assert_eq!(
            f.navigator.redirects(),
            vec![("/login".to_string(), Some(SESSION_EXPIRED_NOTICE.to_string()))]
        );
    }

    #[tokio::test]
    async fn initialize_undecodable_token_clears() {
        let f = fixture(MockAuthApi::rejecting());
        f.manager
            .store()
            .set_token(SecretString::from("garbage"))
            .unwrap();

        let flags = f.manager.initialize().await;
        assert!(!flags.is_authenticated);
        assert!(f.manager.store().get_token().is_none());
        assert_eq!(f.api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn login_establishes_session() {
        let token = make_jwt(now() + 600, Some("admin"));
        let f = fixture(MockAuthApi::rejecting().with_login(&token));

        let flags = f
            .manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap();
        assert!(flags.is_authenticated && flags.is_admin && flags.is_initialized);
        assert_eq!(f.manager.access_token().unwrap().expose_secret(), token);
    }

    #[tokio::test]
    async fn login_failure_leaves_session_signed_out() {
        let f = fixture(MockAuthApi::rejecting().with_login("unused"));
        let err = f
            .manager
            .login("a@b.c", &SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::Unauthorized);
        assert!(!f.manager.state().flags().is_authenticated);
        assert!(f.manager.store().get_token().is_none());
    }

    #[tokio::test]
    async fn login_with_undecodable_token_is_rejected() {
        let f = fixture(MockAuthApi::rejecting().with_login("opaque"));
        let err = f
            .manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::InvalidToken);
        assert!(f.manager.store().get_token().is_none());
    }

    #[tokio::test]
    async fn login_with_expired_token_is_rejected() {
        let f = fixture(MockAuthApi::rejecting().with_login(&make_jwt(now() - 5, None)));
        let err = f
            .manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::InvalidToken);
        assert!(!f.manager.state().flags().is_authenticated);
        assert!(f.manager.store().get_token().is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let token = make_jwt(now() + 600, None);
        let f = fixture(MockAuthApi::rejecting().with_login(&token));
        let _ = f
            .manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap();

        f.manager.logout().await.unwrap();
        assert_eq!(f.api.logout_calls(), 1);
        assert!(!f.manager.state().flags().is_authenticated);
        assert!(f.manager.store().get_token().is_none());
        assert_eq!(f.navigator.redirects(), vec![("/login".to_string(), None)]);
    }

    #[tokio::test]
    async fn logout_redirects_even_when_storage_refuses_delete() {
        let token = make_jwt(now() + 600, None);
        let api = Arc::new(MockAuthApi::rejecting().with_login(&token));
        let navigator = Arc::new(RecordingNavigator::new());
        let store = TokenStore::new(
            Arc::new(UndeletableStorage(MemoryStorage::new())),
            secrets::generate_key(),
        );
        let manager = SessionManager::new(
            api.clone(),
            store,
            navigator.clone(),
            SessionConfig::default(),
        );
        let _ = manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap();

        let err = manager.logout().await.unwrap_err();
        assert_matches!(err, AuthError::Io(_));
        assert_eq!(api.logout_calls(), 1);
        assert!(!manager.state().flags().is_authenticated);
        assert_eq!(navigator.redirects(), vec![("/login".to_string(), None)]);
    }

    #[tokio::test]
    async fn expire_redirects_with_notice() {
        let token = make_jwt(now() + 600, None);
        let f = fixture(MockAuthApi::rejecting().with_login(&token));
        let _ = f
            .manager
            .login("a@b.c", &SecretString::from("correct"))
            .await
            .unwrap();

        f.manager.expire();
        assert!(f.manager.store().get_token().is_none());
        assert!(f.manager.state().flags().is_initialized);
        assert!(!f.manager.state().flags().is_authenticated);
        assert_eq!(
            f.navigator.redirects(),
            vec![("/login".to_string(), Some(SESSION_EXPIRED_NOTICE.to_string()))]
        );
    }

    #[test]
    fn access_token_requires_valid_token() {
        let f = fixture(MockAuthApi::rejecting());
        assert_matches!(f.manager.access_token(), Err(AuthError::AuthRequired));
        f.manager
            .store()
            .set_token(SecretString::from(make_jwt(now() - 1, None)))
            .unwrap();
        assert_matches!(f.manager.access_token(), Err(AuthError::AuthRequired));
    }

    #[test]
    fn config_from_settings() {
        let mut settings = HirelaneSettings::default();
        settings.session.refresh_timeout_ms = 1500;
        settings.session.refresh_threshold_secs = 30;
        let config = SessionConfig::from_settings(&settings);
        assert_eq!(config.refresh_timeout, Duration::from_millis(1500));
        assert_eq!(config.refresh_threshold_secs, 30);
        assert_eq!(config.routes.login, "/login");
    }

    #[test]
    fn expired_token_stops_authenticating() {
        let exp = now() + 60;
        let state = SessionState::new();
        state.mark_initialized();
        state.establish(&TokenClaims {
            exp,
            is_admin: Some(true),
            ..TokenClaims::default()
        });

        let before = DateTime::from_timestamp(exp - 1, 0).unwrap();
        let at_expiry = DateTime::from_timestamp(exp, 0).unwrap();
        assert!(state.flags_at(before).is_authenticated);
        assert_eq!(
            state.flags_at(at_expiry),
            SessionFlags {
                is_initialized: true,
                ..SessionFlags::default()
            }
        );

        let guard = SessionGuard::new(RouteSettings::default());
        assert_eq!(
            guard.evaluate(RouteAccess::protected(), state.flags_at(before)),
            GuardDecision::Render
        );
        assert_eq!(
            guard.evaluate(RouteAccess::protected(), state.flags_at(at_expiry)),
            GuardDecision::Redirect("/login".to_string())
        );
    }

    #[test]
    fn snapshot_reports_expired_token_as_signed_out() {
        let state = SessionState::new();
        state.establish(&TokenClaims {
            exp: now() - 1,
            sub: Some("user-1".to_string()),
            is_admin: Some(true),
            ..TokenClaims::default()
        });
        let snapshot = state.snapshot();
        assert!(!snapshot.is_authenticated);
        assert!(!snapshot.is_admin);
        assert!(!state.flags().is_authenticated);
        assert_eq!(snapshot.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn clear_keeps_initialized() {
        let state = SessionState::new();
        state.mark_initialized();
        state.establish(&TokenClaims {
            exp: now() + 10,
            is_admin: Some(true),
            ..TokenClaims::default()
        });
        assert!(state.flags().is_admin);
        state.clear();
        assert_eq!(
            state.flags(),
            SessionFlags {
                is_initialized: true,
                ..SessionFlags::default()
            }
        );
        assert!(state.snapshot().expires_at.is_none());
    }
}
