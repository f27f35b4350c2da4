//! Authenticated HTTP client: the request and response interceptors.
//!
//! Outbound: refresh first if the token is about to expire, then attach the
//! bearer and the security headers. Inbound: a 401 on a first attempt joins
//! (or starts) a refresh and re-issues the request once; a 401 on the retry
//! ends the session. If the stored token already changed while the first
//! attempt was in flight, the retry uses it without another refresh.
//! Non-auth failures pass through untouched.
//!
//! The retry decision itself is the pure pair [`classify_status`] and
//! [`next_step`]; [`AuthClient::execute`] only carries it out.

use std::sync::Arc;

use hirelane_settings::ApiSettings;
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::coordinator::RefreshCoordinator;
use crate::errors::AuthError;
use crate::headers;
use crate::session::{SessionEffects, SessionManager};
use crate::store::TokenStore;
use crate::validator;

/// Coarse classification of a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    /// 1xx, 2xx, 3xx.
    Success,
    /// 401.
    Unauthorized,
    /// Any other 4xx. The feature that made the call interprets it.
    ClientError,
    /// 5xx.
    ServerError,
}

/// What to do with a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryStep {
    /// Hand the response to the caller.
    Deliver,
    /// Refresh the token and issue the request once more.
    RefreshAndRetry,
    /// End the session and fail with [`AuthError::Unauthorized`].
    Expire,
    /// Fail with [`AuthError::TransientNetwork`].
    Fail,
}

/// Classify a status code.
pub fn classify_status(status: StatusCode) -> ResponseClass {
    if status == StatusCode::UNAUTHORIZED {
        ResponseClass::Unauthorized
    } else if status.is_server_error() {
        ResponseClass::ServerError
    } else if status.is_client_error() {
        ResponseClass::ClientError
    } else {
        ResponseClass::Success
    }
}

/// Decide the next step. `already_retried` is also set for requests that
/// cannot be re-issued, which makes their first 401 terminal.
pub fn next_step(class: ResponseClass, already_retried: bool) -> RetryStep {
    match class {
        ResponseClass::Success | ResponseClass::ClientError => RetryStep::Deliver,
        ResponseClass::ServerError => RetryStep::Fail,
        ResponseClass::Unauthorized if already_retried => RetryStep::Expire,
        ResponseClass::Unauthorized => RetryStep::RefreshAndRetry,
    }
}

/// Whether the stored token has replaced the one a request was sent with.
pub fn superseded(sent: Option<&SecretString>, stored: Option<&SecretString>) -> bool {
    match stored {
        Some(stored) => sent.is_none_or(|sent| sent.expose_secret() != stored.expose_secret()),
        None => false,
    }
}

/// HTTP client that runs every request through the session interceptors.
#[derive(Clone, Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    api: ApiSettings,
    store: TokenStore,
    coordinator: RefreshCoordinator,
    effects: Arc<SessionEffects>,
    refresh_threshold_secs: u64,
}

impl AuthClient {
    /// Build a client bound to `session`. Pass the same `reqwest::Client`
    /// the auth API uses so both share cookies.
    pub fn new(http: reqwest::Client, api: &ApiSettings, session: &SessionManager) -> Self {
        Self {
            http,
            api: api.clone(),
            store: session.store().clone(),
            coordinator: session.coordinator().clone(),
            effects: Arc::clone(session.effects()),
            refresh_threshold_secs: session.config().refresh_threshold_secs,
        }
    }

    /// Start a request to `path` under the API base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.api.url(path))
    }

    /// Start a GET request.
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Start a POST request.
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Build and [`execute`](Self::execute) a request.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        self.execute(builder.build()?).await
    }

    /// Run `request` through both interceptors.
    #[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.url().path()))]
    pub async fn execute(&self, request: Request) -> Result<Response, AuthError> {
        let retry = request.try_clone();
        let (first, sent) = self.dispatch(request).await?;
        let step = next_step(classify_status(first.status()), retry.is_none());

        let (RetryStep::RefreshAndRetry, Some(retry)) = (step, retry) else {
            return self.finish(step, first);
        };

        metrics::counter!("auth_retry_total").increment(1);
        if superseded(sent.as_ref(), self.store.get_token().as_ref()) {
            tracing::debug!("401 received for a replaced token, retrying with the current one");
        } else {
            tracing::debug!("401 received, refreshing before retry");
            let _ = self.coordinator.refresh().await?;
        }

        let (second, _) = self.dispatch(retry).await?;
        self.finish(next_step(classify_status(second.status()), true), second)
    }

    /// Send `request`, returning the response and the bearer it carried.
    async fn dispatch(
        &self,
        mut request: Request,
    ) -> Result<(Response, Option<SecretString>), AuthError> {
        let sent = self.prepare(&mut request).await?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(AuthError::from_transport)?;
        Ok((response, sent))
    }

    /// Request interceptor. Returns the bearer attached, if any.
    async fn prepare(&self, request: &mut Request) -> Result<Option<SecretString>, AuthError> {
        let mut token = self.store.get_token();
        let expiring = token.as_ref().is_some_and(|t| {
            validator::will_expire_soon(t.expose_secret(), self.refresh_threshold_secs)
        });
        if expiring {
            token = match self.coordinator.refresh().await {
                Ok(fresh) => Some(fresh),
                Err(e) => {
                    tracing::debug!(error = %e, "proactive refresh failed, sending without token");
                    None
                }
            };
        }

        let headers = request.headers_mut();
        headers::apply_security_headers(headers);
        if let Some(token) = &token {
            headers::set_bearer(headers, token)?;
        }
        Ok(token)
    }

    fn finish(&self, step: RetryStep, response: Response) -> Result<Response, AuthError> {
        match step {
            RetryStep::Deliver => Ok(response),
            RetryStep::Fail => Err(AuthError::TransientNetwork(format!(
                "server responded {}",
                response.status()
            ))),
            RetryStep::Expire | RetryStep::RefreshAndRetry => {
                tracing::warn!("request rejected after refresh, ending session");
                self.effects.expire();
                Err(AuthError::Unauthorized)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
