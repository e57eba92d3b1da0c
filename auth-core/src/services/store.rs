use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Account, AccountStatus, IdentityProvider, LinkedIdentity, Rotation, Session};
use crate::services::error::StoreError;

/// Durable refresh sessions. Tokens are passed in the clear and hashed by the
/// implementation; only hashes are ever stored.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        account_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<Uuid, StoreError>;

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError>;

    /// Replace `current_token` with `new_token` only if the session still
    /// holds `current_token`. At most one of several concurrent callers
    /// presenting the same token observes [`Rotation::Rotated`].
    async fn rotate(
        &self,
        session_id: Uuid,
        current_token: &str,
        new_token: &str,
        new_expires_utc: DateTime<Utc>,
    ) -> Result<Rotation, StoreError>;

    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError>;

    /// Idempotent.
    async fn delete_by_token(&self, refresh_token: &str) -> Result<(), StoreError>;

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, StoreError>;

    /// Session whose previous (already rotated) token is `refresh_token`.
    async fn find_by_rotated_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError>;

    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Fails with `EmailTaken` / `UsernameTaken` on a uniqueness violation.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    /// Insert a passwordless account together with its first linked identity.
    /// Either both are written or neither is. Fails like [`insert`] or
    /// [`link_identity`].
    ///
    /// [`insert`]: AccountDirectory::insert
    /// [`link_identity`]: AccountDirectory::link_identity
    async fn insert_federated(
        &self,
        account: &Account,
        identity: &LinkedIdentity,
    ) -> Result<(), StoreError>;

    /// Returns `false` when the account does not exist.
    async fn update_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError>;

    async fn find_by_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Fails with `IdentityTaken` when `(provider, subject)` is already linked.
    async fn link_identity(&self, identity: &LinkedIdentity) -> Result<(), StoreError>;

    async fn list_identities(&self, account_id: Uuid) -> Result<Vec<LinkedIdentity>, StoreError>;
}
