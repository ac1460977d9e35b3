//! Bearer tokens for authenticated ESI endpoints

use super::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use structwatch_common::config::SsoConfig;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens expiring within this margin are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies the bearer token of a request
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, FetchError>;
}

/// A fixed access token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

struct TokenState {
    access_token: Option<String>,
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

/// Access token refreshed through the SSO refresh token grant
pub struct RefreshingToken {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    state: Mutex<TokenState>,
}

impl RefreshingToken {
    pub fn new(http: Client, sso: &SsoConfig, refresh_token: impl Into<String>) -> Self {
        Self {
            http,
            token_url: sso.token_url.clone(),
            client_id: sso.client_id.clone(),
            client_secret: sso.client_secret.clone(),
            state: Mutex::new(TokenState {
                access_token: None,
                expires_at: DateTime::<Utc>::MIN_UTC,
                refresh_token: refresh_token.into(),
            }),
        }
    }

    /// Current refresh token, which SSO may rotate on every refresh
    pub async fn refresh_token(&self) -> String {
        self.state.lock().await.refresh_token.clone()
    }

    async fn refresh(&self, state: &mut TokenState) -> Result<(), FetchError> {
        debug!("Refreshing SSO access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", state.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 | 403 => FetchError::Auth(format!("token refresh rejected: {}", message)),
                code => FetchError::from_status(code, message),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        state.access_token = Some(token.access_token);
        state.expires_at = Utc::now() + Duration::seconds(token.expires_in);
        if let Some(refresh_token) = token.refresh_token {
            state.refresh_token = refresh_token;
        }
        info!(expires_at = %state.expires_at, "SSO access token refreshed");
        Ok(())
    }
}

#[async_trait]
impl TokenSource for RefreshingToken {
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut state = self.state.lock().await;
        let fresh_until = Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS);
        if let Some(token) = &state.access_token {
            if state.expires_at > fresh_until {
                return Ok(token.clone());
            }
        }
        self.refresh(&mut state).await?;
        state
            .access_token
            .clone()
            .ok_or_else(|| FetchError::Auth("no access token after refresh".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sso(server: &MockServer) -> SsoConfig {
        SsoConfig {
            token_url: format!("{}/v2/oauth/token", server.uri()),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refreshes_once_and_reuses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-1",
                "expires_in": 1200,
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = RefreshingToken::new(Client::new(), &sso(&server), "old-refresh");
        assert_eq!(token.access_token().await.unwrap(), "access-1");
        assert_eq!(token.access_token().await.unwrap(), "access-1");
        assert_eq!(token.refresh_token().await, "new-refresh");
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short-lived",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let token = RefreshingToken::new(Client::new(), &sso(&server), "refresh");
        token.access_token().await.unwrap();
        token.access_token().await.unwrap();
        assert_eq!(token.refresh_token().await, "refresh");
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let token = RefreshingToken::new(Client::new(), &sso(&server), "revoked");
        assert!(matches!(
            token.access_token().await,
            Err(FetchError::Auth(_))
        ));
    }
}
