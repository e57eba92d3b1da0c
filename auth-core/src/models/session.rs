//! Refresh session model - one row per outstanding refresh token.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use super::AccountView;

/// Refresh session entity.
///
/// Only the SHA-256 of the refresh token is stored. Rotation replaces
/// `token_hash` in place and keeps the previous hash for reuse detection.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub previous_token_hash: Option<String>,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub rotated_utc: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(account_id: Uuid, refresh_token: &str, expires_utc: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            account_id,
            token_hash: hash_token(refresh_token),
            previous_token_hash: None,
            expires_utc,
            created_utc: Utc::now(),
            rotated_utc: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_utc
    }
}

/// Hash a refresh token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of a conditional rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotated,
    /// The session is gone or no longer holds the presented token.
    NotFound,
}

/// Token pair handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Login result: tokens plus the account projection.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub account: AccountView,
    /// Set when a federated login created the account.
    pub is_new_account: bool,
}
