//! botpush Remote Client Module
//! OAuth refresh-token exchange and the bot script endpoint (GET/PUT)

use crate::engine::config::PushConfig;
use crate::engine::credentials::{BearerToken, CredentialSet};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Status codes the script endpoint uses to confirm a write
pub const WRITE_SUCCESS_STATUSES: [u16; 3] = [200, 201, 204];

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("OAuth error: {0}")]
    OAuthError(String),
    #[error("Response is missing field `{0}`")]
    MissingField(&'static str),
    #[error("Response field `{0}` has an unexpected type")]
    InvalidField(&'static str),
    #[error("Remote script is empty")]
    EmptyScript,
}

impl RemoteError {
    /// HTTP status of the failed call, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Token response from the OAuth endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScriptPayload<'a> {
    script: &'a str,
}

pub fn is_write_success(status: StatusCode) -> bool {
    WRITE_SUCCESS_STATUSES.contains(&status.as_u16())
}

/// HTTP collaborator for the token and script endpoints.
///
/// Every call is attempted exactly once; retries are the caller's concern.
pub struct ScriptClient {
    config: PushConfig,
    http_client: reqwest::Client,
}

impl ScriptClient {
    pub fn new(config: &PushConfig) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    /// Exchange the refresh token for a bearer token
    pub async fn exchange_refresh_token(
        &self,
        credentials: &CredentialSet,
    ) -> Result<BearerToken, RemoteError> {
        debug!(client_id = %credentials.masked_client_id(), "Requesting access token");

        let response = self.http_client
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.secret().as_str()),
                ("refresh_token", credentials.refresh_token.secret().as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status { status, body });
        }

        let token_response: TokenResponse = response.json().await?;

        if let Some(error) = token_response.error {
            return Err(RemoteError::OAuthError(
                token_response.error_description.unwrap_or(error),
            ));
        }

        match token_response.access_token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(RemoteError::MissingField("access_token")),
        }
    }

    /// Read the script currently deployed for `bot_id`
    pub async fn fetch_script(&self, token: &BearerToken, bot_id: &str) -> Result<String, RemoteError> {
        let response = self.http_client
            .get(self.config.script_url(bot_id))
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status { status, body });
        }

        let data: serde_json::Value = response.json().await?;
        let script = match data.get("script") {
            None | Some(serde_json::Value::Null) => return Err(RemoteError::MissingField("script")),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => return Err(RemoteError::InvalidField("script")),
        };

        // An empty script is never a trustworthy snapshot
        if script.is_empty() {
            return Err(RemoteError::EmptyScript);
        }

        Ok(script)
    }

    /// Overwrite the script for `bot_id`. Returns the accepted status code.
    pub async fn put_script(
        &self,
        token: &BearerToken,
        bot_id: &str,
        script: &str,
    ) -> Result<u16, RemoteError> {
        let response = self.http_client
            .put(self.config.script_url(bot_id))
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .json(&ScriptPayload { script })
            .send()
            .await?;

        let status = response.status();
        if is_write_success(status) {
            return Ok(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status { status: status.as_u16(), body })
    }
}
