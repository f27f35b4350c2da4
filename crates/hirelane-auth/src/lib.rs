//! # hirelane-auth
//!
//! Client-side session core for the hirelane dashboard. Every outbound API
//! call passes through here.
//!
//! - [`store`]: the access token, encrypted at rest ([`secrets`])
//! - [`validator`]: local expiry checks on the token's claims
//! - [`coordinator`]: single-flight refresh shared by all callers
//! - [`client`]: request and response interceptors around `reqwest`
//! - [`session`]: session state, login/logout, forced expiry
//! - [`guard`]: route access policy over the session flags
//! - [`api`]: the backend's credential endpoints
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hirelane_auth::{AuthClient, HttpAuthApi, NoopNavigator, SessionConfig, SessionManager, TokenStore};
//! use hirelane_settings::HirelaneSettings;
//!
//! # async fn run() -> Result<(), hirelane_auth::AuthError> {
//! let settings = HirelaneSettings::default();
//! let api = HttpAuthApi::new(&settings.api)?;
//! let http = api.client().clone();
//! let session = SessionManager::new(
//!     Arc::new(api),
//!     TokenStore::in_memory(),
//!     Arc::new(NoopNavigator),
//!     SessionConfig::from_settings(&settings),
//! );
//! let _flags = session.initialize().await;
//! let client = AuthClient::new(http, &settings.api, &session);
//! let jobs = client.send(client.get("/jobs")).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod api;
pub mod client;
pub mod coordinator;
pub mod errors;
pub mod guard;
pub mod headers;
pub mod secrets;
pub mod session;
pub mod store;
pub mod validator;

#[cfg(test)]
mod testutil;

pub use api::{AuthApi, HttpAuthApi};
pub use client::{AuthClient, ResponseClass, RetryStep, classify_status, next_step, superseded};
pub use coordinator::{RefreshCoordinator, RefreshOutcome, SessionSink};
pub use errors::{AuthError, RefreshError, SESSION_EXPIRED_NOTICE};
pub use guard::{GuardDecision, RouteAccess, RouteTable, SessionGuard};
pub use secrets::{SecretError, TokenCipher};
pub use session::{
    Navigator, NoopNavigator, RecordingNavigator, SessionConfig, SessionEffects, SessionFlags,
    SessionManager, SessionSnapshot, SessionState,
};
pub use store::{FileStorage, MemoryStorage, StorageBackend, TokenStore};
pub use validator::{TokenClaims, decode_claims, is_valid, will_expire_soon};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
