//! botpush Credentials Module
//! OAuth credential set supplied by the caller for one push attempt

use oauth2::{AccessToken, ClientId, ClientSecret, RefreshToken};
use std::fmt;

/// Credentials for one process invocation.
///
/// Immutable once built. Secrets are wrapped in `oauth2` newtypes whose
/// `Debug` output is redacted, so the whole set is safe to pass to `tracing`.
#[derive(Clone)]
pub struct CredentialSet {
    pub org_id: String,
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub refresh_token: RefreshToken,
    pub bot_id: String,
}

impl CredentialSet {
    pub fn new(
        org_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        bot_id: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            refresh_token: RefreshToken::new(refresh_token.into()),
            bot_id: bot_id.into(),
        }
    }

    /// Client id with all but the last four characters masked
    pub fn masked_client_id(&self) -> String {
        mask(self.client_id.as_str())
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("org_id", &self.org_id)
            .field("client_id", &self.masked_client_id())
            .field("client_secret", &self.client_secret)
            .field("refresh_token", &self.refresh_token)
            .field("bot_id", &self.bot_id)
            .finish()
    }
}

/// Bearer token obtained from the refresh-token exchange.
///
/// Created once per run and never persisted.
#[derive(Debug, Clone)]
pub struct BearerToken(AccessToken);

impl BearerToken {
    pub fn new(token: String) -> Self {
        Self(AccessToken::new(token))
    }

    pub fn secret(&self) -> &str {
        self.0.secret()
    }
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
