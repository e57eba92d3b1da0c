use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{AuthConfig, SessionPolicy},
    models::{
        Account, AccountStatus, AccountView, AuthResponse, ExternalIdentity, LinkedIdentity,
        RegisterRequest, Rotation, TokenPair,
    },
    services::{
        jwt::AccessTokenClaims, AccountDirectory, AuthError, Database, GoogleIdentityProvider,
        IdentityProviderAdapter, JwtService, SessionStore, StoreError,
    },
    utils::{
        normalize_email, validate_request, CredentialHasher, HashingParams, Password,
        PasswordHashString,
    },
};

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_BASE_MAX_LEN: usize = 24;
const USERNAME_SUFFIX_LEN: usize = 6;
const USERNAME_ATTEMPTS: usize = 5;

/// Authentication operations over an account directory, a session store and
/// an identity provider.
///
/// Holds no per-request state; every operation is safe to call concurrently
/// and is cancelled by dropping its future.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountDirectory>,
    sessions: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProviderAdapter>,
    jwt: JwtService,
    hasher: Arc<CredentialHasher>,
    policy: SessionPolicy,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        sessions: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProviderAdapter>,
        jwt: JwtService,
        hasher: CredentialHasher,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            accounts,
            sessions,
            identity,
            jwt,
            hasher: Arc::new(hasher),
            policy,
        }
    }

    /// Wire the service against PostgreSQL and Google from configuration,
    /// running pending migrations first.
    pub async fn from_config(config: &AuthConfig) -> Result<Self, anyhow::Error> {
        let pool = crate::db::create_pool(&config.database).await?;
        crate::db::run_migrations(&pool).await?;

        let database = Arc::new(Database::new(pool));
        let google = Arc::new(GoogleIdentityProvider::new(config.google.clone())?);
        let hasher = CredentialHasher::new(HashingParams::default())?;

        Ok(Self::new(
            database.clone(),
            database,
            google,
            JwtService::new(&config.jwt),
            hasher,
            config.session.clone(),
        ))
    }

    #[tracing::instrument(skip_all, fields(email = %req.email, username = %req.username))]
    pub async fn register(&self, mut req: RegisterRequest) -> Result<AccountView, AuthError> {
        req.email = normalize_email(&req.email);
        validate_request(&req)?;

        if self.accounts.find_by_email(&req.email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        if self.accounts.find_by_username(&req.username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = self.hash_password(Password::new(req.password)).await?;
        let display_name = req.display_name.filter(|n| !n.trim().is_empty());

        let account = Account::new_local(req.email, req.username, password_hash, display_name);
        self.accounts.insert(&account).await?;

        tracing::info!(account_id = %account.account_id, "Account registered");

        Ok(account.projection())
    }

    #[tracing::instrument(skip_all)]
    pub async fn password_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);
        let password = Password::new(password.to_string());

        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                self.dummy_verify(password).await?;
                tracing::info!("Login failed: unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let Some(password_hash) = account.password_hash.clone() else {
            self.dummy_verify(password).await?;
            tracing::info!(account_id = %account.account_id, "Login failed: no password credential");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(password, password_hash).await? {
            tracing::info!(account_id = %account.account_id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        ensure_active(&account)?;

        let response = self.issue_tokens(&account, false).await?;
        tracing::info!(account_id = %account.account_id, "Password login succeeded");
        Ok(response)
    }

    #[tracing::instrument(skip_all)]
    pub async fn federated_login(&self, code: &str) -> Result<AuthResponse, AuthError> {
        let identity = self.identity.exchange_code(code).await?;

        if !identity.email_verified {
            tracing::warn!(
                provider = self.identity.provider().as_str(),
                external_id = %identity.external_id,
                "Federated login rejected: email not verified"
            );
            return Err(AuthError::UnverifiedEmail);
        }

        let email = normalize_email(&identity.email);

        let linked = self
            .accounts
            .find_by_identity(identity.provider, &identity.external_id)
            .await?;

        let (account, is_new_account) = match linked {
            Some(account) => (account, false),
            None => match self.accounts.find_by_email(&email).await? {
                Some(account) => (self.link_identity(account, &identity).await?, false),
                None => self.create_federated_account(&email, &identity).await?,
            },
        };

        ensure_active(&account)?;

        let response = self.issue_tokens(&account, is_new_account).await?;
        tracing::info!(
            account_id = %account.account_id,
            is_new_account,
            "Federated login succeeded"
        );
        Ok(response)
    }

    /// Exchange a refresh token for a new token pair. The presented token is
    /// consumed: a second use fails even if the first is still in flight.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let session = match self.sessions.find_by_token(refresh_token).await? {
            Some(session) => session,
            None => {
                self.detect_reuse(refresh_token).await?;
                return Err(AuthError::InvalidOrExpiredToken);
            }
        };

        if session.is_expired() {
            self.sessions.delete(session.session_id).await?;
            tracing::info!(session_id = %session.session_id, "Refresh rejected: session expired");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let account = match self.accounts.find_by_id(session.account_id).await? {
            Some(account) => account,
            None => {
                self.sessions.delete(session.session_id).await?;
                tracing::warn!(
                    account_id = %session.account_id,
                    "Refresh rejected: session without account"
                );
                return Err(AuthError::InvalidOrExpiredToken);
            }
        };

        if let Err(e) = ensure_active(&account) {
            self.sessions.delete(session.session_id).await?;
            tracing::info!(account_id = %account.account_id, error = %e, "Refresh rejected");
            return Err(e);
        }

        let new_refresh_token = self.jwt.generate_refresh_token();
        let expires_utc = Utc::now() + self.jwt.refresh_token_ttl();

        match self
            .sessions
            .rotate(session.session_id, refresh_token, &new_refresh_token, expires_utc)
            .await?
        {
            Rotation::Rotated => {}
            Rotation::NotFound => {
                tracing::warn!(
                    session_id = %session.session_id,
                    "Refresh rejected: token already rotated"
                );
                return Err(AuthError::InvalidOrExpiredToken);
            }
        }

        let access_token = self.issue_access_token(&account)?;

        tracing::info!(account_id = %account.account_id, "Refresh token rotated");

        Ok(AuthResponse {
            tokens: TokenPair::new(
                access_token,
                new_refresh_token,
                self.jwt.access_token_expiry_seconds(),
            ),
            account: account.projection(),
            is_new_account: false,
        })
    }

    /// Idempotent.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.delete_by_token(refresh_token).await?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Ban an account and revoke all of its sessions. Returns the number of
    /// sessions revoked.
    #[tracing::instrument(skip(self))]
    pub async fn admin_ban(&self, account_id: Uuid) -> Result<u64, AuthError> {
        self.restrict(account_id, AccountStatus::Banned).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn admin_suspend(&self, account_id: Uuid) -> Result<u64, AuthError> {
        self.restrict(account_id, AccountStatus::Suspended).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn admin_reinstate(&self, account_id: Uuid) -> Result<(), AuthError> {
        if !self
            .accounts
            .update_status(account_id, AccountStatus::Active)
            .await?
        {
            return Err(AuthError::AccountNotFound);
        }

        tracing::info!(%account_id, "Account reinstated");
        Ok(())
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountView, AuthError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .map(|account| account.projection())
            .ok_or(AuthError::AccountNotFound)
    }

    pub async fn linked_identities(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<LinkedIdentity>, AuthError> {
        Ok(self.accounts.list_identities(account_id).await?)
    }

    /// Verify an access token. Performs no store lookup.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessTokenClaims, AuthError> {
        Ok(self.jwt.verify(access_token)?)
    }

    /// Verify an `Authorization` header value of the form `Bearer <token>`.
    pub fn authenticate_bearer(&self, header: &str) -> Result<AccessTokenClaims, AuthError> {
        Ok(self.jwt.authenticate_bearer(header)?)
    }

    /// Log out everywhere.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all_sessions(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self.sessions.delete_all_for_account(account_id).await?;
        tracing::info!(%account_id, revoked, "Revoked all sessions");
        Ok(revoked)
    }

    #[tracing::instrument(skip(self))]
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        let purged = self.sessions.purge_expired().await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }

    pub fn google_authorization_url(&self, state: &str) -> String {
        self.identity.authorization_url(state)
    }

    async fn restrict(&self, account_id: Uuid, status: AccountStatus) -> Result<u64, AuthError> {
        // Status first: a refresh racing the revocation still sees the new status.
        if !self.accounts.update_status(account_id, status).await? {
            return Err(AuthError::AccountNotFound);
        }

        let revoked = self.sessions.delete_all_for_account(account_id).await?;

        tracing::info!(
            %account_id,
            status = status.as_str(),
            revoked,
            "Account restricted and sessions revoked"
        );
        Ok(revoked)
    }

    async fn detect_reuse(&self, refresh_token: &str) -> Result<(), AuthError> {
        let Some(session) = self.sessions.find_by_rotated_token(refresh_token).await? else {
            return Ok(());
        };

        tracing::warn!(
            account_id = %session.account_id,
            session_id = %session.session_id,
            "Rotated refresh token presented again"
        );

        if self.policy.revoke_on_reuse {
            let revoked = self
                .sessions
                .delete_all_for_account(session.account_id)
                .await?;
            tracing::warn!(
                account_id = %session.account_id,
                revoked,
                "Revoked all sessions after refresh token reuse"
            );
        }

        Ok(())
    }

    async fn issue_tokens(
        &self,
        account: &Account,
        is_new_account: bool,
    ) -> Result<AuthResponse, AuthError> {
        let access_token = self.issue_access_token(account)?;
        let refresh_token = self.jwt.generate_refresh_token();
        let expires_utc = Utc::now() + self.jwt.refresh_token_ttl();

        self.sessions
            .create(account.account_id, &refresh_token, expires_utc)
            .await?;

        Ok(AuthResponse {
            tokens: TokenPair::new(
                access_token,
                refresh_token,
                self.jwt.access_token_expiry_seconds(),
            ),
            account: account.projection(),
            is_new_account,
        })
    }

    fn issue_access_token(&self, account: &Account) -> Result<String, AuthError> {
        self.jwt
            .issue_access_token(account.account_id, account.role)
            .map_err(|e| AuthError::Internal(anyhow::Error::new(e)))
    }

    async fn link_identity(
        &self,
        account: Account,
        identity: &ExternalIdentity,
    ) -> Result<Account, AuthError> {
        let link = LinkedIdentity::new(
            account.account_id,
            identity.provider,
            identity.external_id.clone(),
        );

        match self.accounts.link_identity(&link).await {
            Ok(()) => {
                tracing::info!(
                    account_id = %account.account_id,
                    provider = identity.provider.as_str(),
                    "Linked external identity"
                );
                Ok(account)
            }
            // A concurrent login linked it first.
            Err(StoreError::IdentityTaken) => self
                .accounts
                .find_by_identity(identity.provider, &identity.external_id)
                .await?
                .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("Linked identity vanished"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the account and whether this call created it.
    async fn create_federated_account(
        &self,
        email: &str,
        identity: &ExternalIdentity,
    ) -> Result<(Account, bool), AuthError> {
        let base = username_from_email(email);
        let mut username = base.clone();

        for _ in 0..USERNAME_ATTEMPTS {
            if self.accounts.find_by_username(&username).await?.is_none() {
                let account = Account::new_federated(
                    email.to_string(),
                    username.clone(),
                    identity.display_name.clone(),
                );
                let link = LinkedIdentity::new(
                    account.account_id,
                    identity.provider,
                    identity.external_id.clone(),
                );

                match self.accounts.insert_federated(&account, &link).await {
                    Ok(()) => {
                        tracing::info!(
                            account_id = %account.account_id,
                            username = %account.username,
                            provider = identity.provider.as_str(),
                            "Account created from federated login"
                        );
                        return Ok((account, true));
                    }
                    Err(StoreError::UsernameTaken) => {}
                    // A concurrent login created the account first.
                    Err(StoreError::EmailTaken | StoreError::IdentityTaken) => {
                        let account = self.find_concurrent_account(email, identity).await?;
                        return Ok((account, false));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            username = format!("{}_{}", base, random_suffix());
        }

        Err(AuthError::Internal(anyhow::anyhow!(
            "Could not allocate a unique username"
        )))
    }

    async fn find_concurrent_account(
        &self,
        email: &str,
        identity: &ExternalIdentity,
    ) -> Result<Account, AuthError> {
        if let Some(account) = self
            .accounts
            .find_by_identity(identity.provider, &identity.external_id)
            .await?
        {
            return Ok(account);
        }

        match self.accounts.find_by_email(email).await? {
            Some(account) => self.link_identity(account, identity).await,
            None => Err(AuthError::Internal(anyhow::anyhow!(
                "Conflicting account vanished"
            ))),
        }
    }

    async fn hash_password(&self, password: Password) -> Result<PasswordHashString, AuthError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(e.into()))??;
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: Password,
        password_hash: PasswordHashString,
    ) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| AuthError::Internal(e.into()))??;
        Ok(matches)
    }

    async fn dummy_verify(&self, password: Password) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.dummy_verify(&password))
            .await
            .map_err(|e| AuthError::Internal(e.into()))
    }
}

fn ensure_active(account: &Account) -> Result<(), AuthError> {
    match account.status {
        AccountStatus::Active => Ok(()),
        AccountStatus::Suspended => Err(AuthError::AccountSuspended),
        AccountStatus::Banned => Err(AuthError::AccountBanned),
    }
}

/// Username candidate from the local part of an email address.
fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let candidate: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(USERNAME_BASE_MAX_LEN)
        .collect();

    if candidate.len() < USERNAME_MIN_LEN {
        format!("user{}", candidate)
    } else {
        candidate
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(USERNAME_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("alice.smith@x.com"), "alice.smith");
        assert_eq!(username_from_email("a+tag@x.com"), "atag");
        assert_eq!(username_from_email("b@x.com"), "userb");
        assert_eq!(
            username_from_email("averyveryveryverylonglocalpart@x.com").len(),
            USERNAME_BASE_MAX_LEN
        );
    }

    #[test]
    fn test_username_with_suffix_stays_valid() {
        let base = username_from_email("averyveryveryverylonglocalpart@x.com");
        let username = format!("{}_{}", base, random_suffix());

        assert!(username.len() <= 32);
        assert!(crate::utils::validate_username(&username).is_ok());
    }

    #[test]
    fn test_ensure_active() {
        let mut account =
            Account::new_federated("a@x.com".to_string(), "alice".to_string(), None);
        assert!(ensure_active(&account).is_ok());

        account.status = AccountStatus::Suspended;
        assert!(matches!(
            ensure_active(&account),
            Err(AuthError::AccountSuspended)
        ));

        account.status = AccountStatus::Banned;
        assert!(matches!(ensure_active(&account), Err(AuthError::AccountBanned)));
    }
}
