use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{ExternalIdentity, IdentityProvider};

/// Failures talking to an identity provider. Never returned to callers of
/// [`crate::services::AuthService`]; they only see `ProviderExchangeFailed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Exchanges a one-time authorization code for a verified external identity.
#[async_trait]
pub trait IdentityProviderAdapter: Send + Sync {
    fn provider(&self) -> IdentityProvider;

    /// URL of the provider's consent screen carrying the caller's `state`.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, ProviderError>;
}

/// Scripted provider for tests and local development.
///
/// Each code is redeemable once, like a real authorization code; unknown or
/// already-used codes fail with `invalid_grant`.
#[derive(Default)]
pub struct MockIdentityProvider {
    responses: Mutex<HashMap<String, Result<ExternalIdentity, ProviderError>>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_identity(&self, code: &str, identity: ExternalIdentity) {
        self.script(code, Ok(identity));
    }

    pub fn add_failure(&self, code: &str, error: ProviderError) {
        self.script(code, Err(error));
    }

    fn script(&self, code: &str, response: Result<ExternalIdentity, ProviderError>) {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        responses.insert(code.to_string(), response);
    }
}

#[async_trait]
impl IdentityProviderAdapter for MockIdentityProvider {
    fn provider(&self) -> IdentityProvider {
        IdentityProvider::Google
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("mock://authorize?state={}", urlencoding::encode(state))
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, ProviderError> {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        responses.remove(code).unwrap_or_else(|| {
            Err(ProviderError::Upstream {
                status: 400,
                body: "invalid_grant".to_string(),
            })
        })
    }
}
