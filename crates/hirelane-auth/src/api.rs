//! Auth API collaborator: credential exchange with the backend.
//!
//! The refresh proof is a server-set cookie, so [`HttpAuthApi`] keeps a
//! cookie store. The current access token is also sent as a bearer when one
//! exists; servers that only look at the cookie ignore it.

use async_trait::async_trait;
use hirelane_settings::ApiSettings;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AuthError;
use crate::headers;

/// Credential exchange endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for an access token.
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, AuthError>;

    /// Obtain a fresh access token for the current session.
    async fn refresh_token(&self, current: Option<&SecretString>)
    -> Result<SecretString, AuthError>;

    /// End the server-side session.
    async fn logout(&self, current: Option<&SecretString>) -> Result<(), AuthError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

/// [`AuthApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    settings: ApiSettings,
}

impl HttpAuthApi {
    /// Build a client with a cookie store and the configured request timeout.
    pub fn new(settings: &ApiSettings) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self::with_client(settings, client))
    }

    /// Use an existing client. The client should carry a cookie store.
    pub fn with_client(settings: &ApiSettings, client: reqwest::Client) -> Self {
        Self {
            client,
            settings: settings.clone(),
        }
    }

    /// Shared HTTP client, so API calls reuse the session cookies.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn headers(current: Option<&SecretString>) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::new();
        headers::apply_security_headers(&mut headers);
        if let Some(token) = current {
            headers::set_bearer(&mut headers, token)?;
        }
        Ok(headers)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[tracing::instrument(skip_all)]
    async fn login(&self, email: &str, password: &SecretString) -> Result<SecretString, AuthError> {
        let body = LoginRequest {
            email,
            password: password.expose_secret(),
        };
        let resp = self
            .client
            .post(self.settings.url("/auth/login"))
            .headers(Self::headers(None)?)
            .json(&body)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "login rejected");
            return Err(login_error(status, text));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(SecretString::from(token.access_token))
    }

    #[tracing::instrument(skip_all)]
    async fn refresh_token(
        &self,
        current: Option<&SecretString>,
    ) -> Result<SecretString, AuthError> {
        let resp = self
            .client
            .post(self.settings.url("/auth/refresh"))
            .headers(Self::headers(current)?)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        let token: TokenResponse = resp.json().await?;
        Ok(SecretString::from(token.access_token))
    }

    #[tracing::instrument(skip_all)]
    async fn logout(&self, current: Option<&SecretString>) -> Result<(), AuthError> {
        let resp = self
            .client
            .post(self.settings.url("/auth/logout"))
            .headers(Self::headers(current)?)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

fn login_error(status: StatusCode, message: String) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::Unauthorized,
        s if s.is_server_error() => AuthError::TransientNetwork(format!("login: status {s}")),
        s => AuthError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> HttpAuthApi {
        let settings = ApiSettings {
            base_url: server.uri(),
            ..ApiSettings::default()
        };
        HttpAuthApi::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn login_returns_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(serde_json::json!({"email": "a@b.c", "password": "pw"})))
            .and(header("x-frame-options", "DENY"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "tok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = api_for(&server)
            .login("a@b.c", &SecretString::from("pw"))
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "tok");
    }

    #[tokio::test]
    async fn login_bad_credentials_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = api_for(&server)
            .login("a@b.c", &SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn login_validation_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad email"))
            .mount(&server)
            .await;

        let err = api_for(&server)
            .login("nope", &SecretString::from("pw"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::Rejected { status: 422, ref message } if message == "bad email");
    }

    #[tokio::test]
    async fn login_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = api_for(&server)
            .login("a@b.c", &SecretString::from("pw"))
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::TransientNetwork(_));
    }

    #[tokio::test]
    async fn refresh_sends_bearer_and_parses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("authorization", "Bearer old"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "new"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = api_for(&server)
            .refresh_token(Some(&SecretString::from("old")))
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "new");
    }

    #[tokio::test]
    async fn refresh_non_2xx_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let err = api_for(&server).refresh_token(None).await.unwrap_err();
        assert_matches!(err, AuthError::Rejected { status: 401, .. });
    }

    #[tokio::test]
    async fn refresh_malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = api_for(&server).refresh_token(None).await.unwrap_err();
        assert_matches!(err, AuthError::Http(_));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let settings = ApiSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ApiSettings::default()
        };
        let api = HttpAuthApi::new(&settings).unwrap();
        let err = api.refresh_token(None).await.unwrap_err();
        assert_matches!(err, AuthError::TransientNetwork(_));
    }

    #[tokio::test]
    async fn logout_posts_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api_for(&server)
            .logout(Some(&SecretString::from("tok")))
            .await
            .unwrap();
    }

    #[test]
    fn login_error_mapping() {
        assert_matches!(
            login_error(StatusCode::FORBIDDEN, String::new()),
            AuthError::Unauthorized
        );
        assert_matches!(
            login_error(StatusCode::BAD_GATEWAY, String::new()),
            AuthError::TransientNetwork(_)
        );
        assert_matches!(
            login_error(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string()),
            AuthError::Rejected { status: 429, .. }
        );
    }
}
