use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GoogleOAuthConfig;
use crate::models::{ExternalIdentity, IdentityProvider};
use crate::services::identity::{IdentityProviderAdapter, ProviderError};

const SCOPES: &str = "openid email profile";
const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
}

impl From<GoogleUserInfo> for ExternalIdentity {
    fn from(info: GoogleUserInfo) -> Self {
        Self {
            provider: IdentityProvider::Google,
            external_id: info.id,
            email: info.email,
            email_verified: info.verified_email,
            display_name: info.name.filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Google OAuth 2.0 authorization-code exchange.
#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Google HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    fn consent_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret().as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(response.text().await.unwrap_or_default());
            tracing::error!(status = %status, "Google token exchange error");
            tracing::debug!(status = %status, body = %body, "Google token exchange error body");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let token: GoogleTokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, ProviderError> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(response.text().await.unwrap_or_default());
            tracing::error!(status = %status, "Google user info error");
            tracing::debug!(status = %status, body = %body, "Google user info error body");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Upstream error bodies are kept short; they can echo request parameters.
fn truncate_body(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(idx);
    }
    body
}

#[async_trait]
impl IdentityProviderAdapter for GoogleIdentityProvider {
    fn provider(&self) -> IdentityProvider {
        IdentityProvider::Google
    }

    fn authorization_url(&self, state: &str) -> String {
        self.consent_url(state)
    }

    #[tracing::instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
        let access_token = self.fetch_access_token(code).await?;
        let user_info = self.fetch_user_info(&access_token).await?;

        tracing::debug!(google_id = %user_info.id, "Fetched Google user info");
        Ok(user_info.into())
    }
}
