//! Linked external identities (federated logins).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity provider codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Google,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "google",
        }
    }
}

impl std::str::FromStr for IdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(IdentityProvider::Google),
            _ => Err(format!("Invalid identity provider: {}", s)),
        }
    }
}

/// An external identity linked to a local account.
/// `subject` is the provider's stable user id (Google `sub`).
#[derive(Debug, Clone, FromRow)]
pub struct LinkedIdentity {
    pub identity_id: Uuid,
    pub account_id: Uuid,
    pub provider_code: String,
    pub subject: String,
    pub created_utc: DateTime<Utc>,
}

impl LinkedIdentity {
    pub fn new(account_id: Uuid, provider: IdentityProvider, subject: String) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            account_id,
            provider_code: provider.as_str().to_string(),
            subject,
            created_utc: Utc::now(),
        }
    }

    pub fn is_provider(&self, provider: IdentityProvider) -> bool {
        self.provider_code == provider.as_str()
    }
}

/// Verified attributes returned by an identity provider code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: IdentityProvider,
    pub external_id: String,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
}
