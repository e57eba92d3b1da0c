use thiserror::Error;

use crate::services::identity::ProviderError;
use crate::services::jwt::TokenError;
use crate::utils::PasswordError;

/// Failures reported by the account directory and session store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Email already registered")]
    EmailTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("External identity already linked")]
    IdentityTaken,

    #[error("Store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(anyhow::Error::new(err))
    }
}

/// Errors returned by [`crate::services::AuthService`] operations.
///
/// Logical failures are plain variants; infrastructure failures carry their
/// cause and are never folded into a logical kind.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is banned")]
    AccountBanned,

    #[error("Account is suspended")]
    AccountSuspended,

    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredToken,

    #[error("Identity provider exchange failed")]
    ProviderExchangeFailed,

    #[error("Identity provider email is not verified")]
    UnverifiedEmail,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Invalid access token: {0}")]
    Token(#[from] TokenError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Stable, transport-agnostic classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    EmailTaken,
    UsernameTaken,
    InvalidCredentials,
    AccountBanned,
    AccountSuspended,
    InvalidOrExpiredToken,
    ProviderExchangeFailed,
    UnverifiedEmail,
    AccountNotFound,
    InvalidAccessToken,
    StoreUnavailable,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::EmailTaken => ErrorKind::EmailTaken,
            AuthError::UsernameTaken => ErrorKind::UsernameTaken,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::AccountBanned => ErrorKind::AccountBanned,
            AuthError::AccountSuspended => ErrorKind::AccountSuspended,
            AuthError::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            AuthError::ProviderExchangeFailed => ErrorKind::ProviderExchangeFailed,
            AuthError::UnverifiedEmail => ErrorKind::UnverifiedEmail,
            AuthError::AccountNotFound => ErrorKind::AccountNotFound,
            AuthError::Token(_) => ErrorKind::InvalidAccessToken,
            AuthError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the same request after backing off.
    ///
    /// Only infrastructure failures qualify. Refresh rotation is not
    /// idempotent, so callers still decide per operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::StoreUnavailable(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => AuthError::EmailTaken,
            StoreError::UsernameTaken => AuthError::UsernameTaken,
            StoreError::IdentityTaken => {
                AuthError::Internal(anyhow::anyhow!("External identity already linked"))
            }
            StoreError::Unavailable(e) => AuthError::StoreUnavailable(e),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(anyhow::Error::new(err))
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        tracing::warn!(error = %err, "Identity provider exchange failed");
        AuthError::ProviderExchangeFailed
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}
