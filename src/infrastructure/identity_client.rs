use crate::domain::models::SessionToken;
use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

/// HTTP surface of the external identity-token provider. The core only needs
/// one operation: exchange the current token for a fresh one.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn refresh_token(&self, current: &SessionToken) -> Result<SessionToken, CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestIdentityClient {
    client: Client,
    token_endpoint: String,
}

#[derive(Debug, serde::Serialize)]
struct RefreshRequestPayload<'a> {
    token: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct RefreshResponsePayload {
    token: String,
    expires_in: Option<i64>,
    detail: Option<String>,
}

impl ReqwestIdentityClient {
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token_endpoint: token_endpoint.into(),
        }
    }

    fn expires_at_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
        now + chrono::Duration::seconds(expires_in.unwrap_or(0).max(0))
    }
}

#[async_trait]
impl IdentityClient for ReqwestIdentityClient {
    async fn refresh_token(&self, current: &SessionToken) -> Result<SessionToken, CoreError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .json(&RefreshRequestPayload {
                token: &current.raw_token,
            })
            .send()
            .await
            .map_err(|error| CoreError::Network(format!("token refresh request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Network(format!("failed reading token response: {error}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<RefreshResponsePayload>(&body)
                .ok()
                .and_then(|parsed| parsed.detail)
                .unwrap_or(body);
            return Err(CoreError::RemoteRequestFailed {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed = serde_json::from_str::<RefreshResponsePayload>(&body).map_err(|error| {
            CoreError::Network(format!("invalid token response payload: {error}; body={body}"))
        })?;

        Ok(SessionToken {
            raw_token: parsed.token,
            expires_at: Self::expires_at_from(Utc::now(), parsed.expires_in),
        })
    }
}
