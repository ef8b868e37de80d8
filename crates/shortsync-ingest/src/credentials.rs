//! Bearer credentials for the remote source and the publishing sink
//!
//! Clients never hold tokens directly; they ask a [`CredentialProvider`] for a
//! valid credential before every request. Two providers exist: a fixed token
//! and an OAuth2 refresh-token exchange that caches the access token until
//! shortly before it expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CredentialError;

/// Refresh this long before the reported expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// An access token and when it stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            access_token: token.into(),
            expires_at: None,
        }
    }

    fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

/// Source of valid bearer credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn valid_credential(&self) -> Result<Credential, CredentialError>;
}

/// A long-lived token supplied by the operator
pub struct StaticCredential {
    credential: Credential,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::bearer(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn valid_credential(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }
}

/// OAuth2 client and refresh token used to mint access tokens
#[derive(Debug, Clone)]
pub struct RefreshTokenConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges a refresh token for short-lived access tokens
pub struct RefreshTokenProvider {
    client: Client,
    config: RefreshTokenConfig,
    cached: Mutex<Option<Credential>>,
}

impl RefreshTokenProvider {
    pub fn new(client: Client, config: RefreshTokenConfig) -> Self {
        Self {
            client,
            config,
            cached: Mutex::new(None),
        }
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        debug!(token_url = %self.config.token_url, "Refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.config.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("HTTP {}", status),
            };
            return Err(if status.is_client_error() {
                CredentialError::Rejected(message)
            } else {
                CredentialError::Decode(message)
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| CredentialError::Decode(e.to_string()))?;

        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        info!(expires_at = ?expires_at, "Obtained access token");

        Ok(Credential {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for RefreshTokenProvider {
    async fn valid_credential(&self) -> Result<Credential, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref().filter(|c| c.is_fresh_at(Utc::now())) {
            return Ok(credential.clone());
        }

        let credential = self.refresh().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }
}
