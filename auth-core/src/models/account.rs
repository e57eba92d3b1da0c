//! Account model - local and federated user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::utils::PasswordHashString;

/// Authorization role carried in access tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Account status codes. Accounts are never deleted, only moved between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "banned" => Ok(AccountStatus::Banned),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

/// Account entity.
///
/// `password_hash` is the optional password credential. Federated accounts
/// have none and are reachable through their linked identities instead.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: Option<PasswordHashString>,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    /// Create an active account with a password credential.
    pub fn new_local(
        email: String,
        username: String,
        password_hash: PasswordHashString,
        display_name: Option<String>,
    ) -> Self {
        Self::new(email, username, Some(password_hash), display_name)
    }

    /// Create an active passwordless account for a federated login.
    pub fn new_federated(email: String, username: String, display_name: Option<String>) -> Self {
        Self::new(email, username, None, display_name)
    }

    fn new(
        email: String,
        username: String,
        password_hash: Option<PasswordHashString>,
        display_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            display_name,
            role: Role::default(),
            status: AccountStatus::Active,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Caller-facing view without credential material.
    pub fn projection(&self) -> AccountView {
        AccountView::from(self)
    }
}

/// Raw `accounts` row; codes are validated when converting to [`Account`].
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub role_code: String,
    pub status_code: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = String;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            account_id: row.account_id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash.map(PasswordHashString::new),
            display_name: row.display_name,
            role: row.role_code.parse()?,
            status: row.status_code.parse()?,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

/// Account projection returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    pub account_id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub has_password: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        Self {
            account_id: a.account_id,
            email: a.email.clone(),
            username: a.username.clone(),
            display_name: a.display_name.clone(),
            role: a.role,
            status: a.status,
            has_password: a.has_password(),
            created_utc: a.created_utc,
        }
    }
}

/// Request to register a new account with a password.
#[derive(Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"), length(max = 255))]
    pub email: String,
    #[validate(
        length(min = 3, max = 32, message = "username must be 3-32 characters"),
        custom(function = "crate::utils::validate_username")
    )]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "password must be 6-128 characters"))]
    pub password: String,
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"***")
            .field("display_name", &self.display_name)
            .finish()
    }
}
