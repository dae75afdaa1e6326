//! OAuth2 client-credentials authentication against Microsoft Entra ID

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;

/// Tokens are refreshed this long before they actually expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Connection credentials for one Dataverse environment
#[derive(Debug, Clone)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// A bearer token and when it stops being usable
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenInfo {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Acquires and caches access tokens for a single resource URL
pub struct AuthManager {
    http: reqwest::Client,
    credentials: Credentials,
    resource: String,
    token: ArcSwapOption<TokenInfo>,
}

impl AuthManager {
    pub fn new(http: reqwest::Client, credentials: Credentials, resource: impl Into<String>) -> Self {
        Self {
            http,
            credentials,
            resource: resource.into().trim_end_matches('/').to_string(),
            token: ArcSwapOption::empty(),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.credentials.tenant_id
        )
    }

    /// Return a cached token, requesting a new one when absent or about to expire
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.load_full() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            debug!("Access token expires at {}, refreshing", token.expires_at);
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        self.token.store(Some(Arc::new(token)));
        Ok(access_token)
    }

    /// Drop the cached token so the next call re-authenticates
    pub fn invalidate(&self) {
        self.token.store(None);
    }

    async fn request_token(&self) -> Result<TokenInfo> {
        let scope = format!("{}/.default", self.resource);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url())
            .form(&params)
            .send()
            .await
            .context("Failed to reach the token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Authentication failed (HTTP {}): {}", status.as_u16(), body);
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        info!("Acquired access token for {}", self.resource);
        Ok(TokenInfo {
            access_token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}
