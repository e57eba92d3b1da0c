use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    hash_token, Account, AccountStatus, IdentityProvider, LinkedIdentity, Rotation, Session,
};
use crate::services::error::StoreError;
use crate::services::store::{AccountDirectory, SessionStore};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    identities: Vec<LinkedIdentity>,
    sessions: HashMap<Uuid, Session>,
}

impl Inner {
    fn check_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::EmailTaken);
        }
        if self.accounts.values().any(|a| a.username == account.username) {
            return Err(StoreError::UsernameTaken);
        }
        Ok(())
    }

    fn check_identity(&self, identity: &LinkedIdentity) -> Result<(), StoreError> {
        if self
            .identities
            .iter()
            .any(|i| i.provider_code == identity.provider_code && i.subject == identity.subject)
        {
            return Err(StoreError::IdentityTaken);
        }
        Ok(())
    }
}

/// In-process account directory and session store.
///
/// Every index lives under one lock, so a rotation's check and write happen
/// atomically just like the conditional `UPDATE` of the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("memory store lock poisoned")))
    }

    /// Number of live session records, expired ones included.
    pub fn session_count(&self) -> usize {
        self.lock().map(|inner| inner.sessions.len()).unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(
        &self,
        account_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        let session = Session::new(account_id, refresh_token, expires_utc);
        let session_id = session.session_id;
        self.lock()?.sessions.insert(session_id, session);
        Ok(session_id)
    }

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        let token_hash = hash_token(refresh_token);
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        current_token: &str,
        new_token: &str,
        new_expires_utc: DateTime<Utc>,
    ) -> Result<Rotation, StoreError> {
        let current_hash = hash_token(current_token);
        let mut inner = self.lock()?;

        match inner.sessions.get_mut(&session_id) {
            Some(session) if session.token_hash == current_hash => {
                session.previous_token_hash = Some(current_hash);
                session.token_hash = hash_token(new_token);
                session.expires_utc = new_expires_utc;
                session.rotated_utc = Some(Utc::now());
                Ok(Rotation::Rotated)
            }
            _ => Ok(Rotation::NotFound),
        }
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.lock()?.sessions.remove(&session_id);
        Ok(())
    }

    async fn delete_by_token(&self, refresh_token: &str) -> Result<(), StoreError> {
        let token_hash = hash_token(refresh_token);
        self.lock()?
            .sessions
            .retain(|_, s| s.token_hash != token_hash);
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn find_by_rotated_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let token_hash = hash_token(refresh_token);
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .values()
            .find(|s| s.previous_token_hash.as_deref() == Some(token_hash.as_str()))
            .cloned())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&account_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_account(account)?;
        inner.accounts.insert(account.account_id, account.clone());
        Ok(())
    }

    async fn insert_federated(
        &self,
        account: &Account,
        identity: &LinkedIdentity,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_account(account)?;
        inner.check_identity(identity)?;
        inner.accounts.insert(account.account_id, account.clone());
        inner.identities.push(identity.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.accounts.get_mut(&account_id) {
            Some(account) => {
                account.status = status;
                account.updated_utc = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError> {
        let inner = self.lock()?;
        let account_id = inner
            .identities
            .iter()
            .find(|i| i.is_provider(provider) && i.subject == subject)
            .map(|i| i.account_id);

        Ok(account_id.and_then(|id| inner.accounts.get(&id).cloned()))
    }

    async fn link_identity(&self, identity: &LinkedIdentity) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.check_identity(identity)?;
        inner.identities.push(identity.clone());
        Ok(())
    }

    async fn list_identities(&self, account_id: Uuid) -> Result<Vec<LinkedIdentity>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .identities
            .iter()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect())
    }
}
