//! PostgreSQL account directory and session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{
    hash_token, Account, AccountRow, AccountStatus, IdentityProvider, LinkedIdentity, Rotation,
    Session,
};
use crate::services::error::StoreError;
use crate::services::store::{AccountDirectory, SessionStore};

const ACCOUNT_COLUMNS: &str = "a.account_id, a.email, a.username, a.password_hash, \
     a.display_name, a.role_code, a.status_code, a.created_utc, a.updated_utc";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }

    async fn fetch_account(
        &self,
        sql: &str,
        key: AccountKey<'_>,
    ) -> Result<Option<Account>, StoreError> {
        let query = sqlx::query_as::<_, AccountRow>(sql);
        let query = match key {
            AccountKey::Id(id) => query.bind(id),
            AccountKey::Text(text) => query.bind(text),
        };

        query
            .fetch_optional(&self.pool)
            .await?
            .map(to_account)
            .transpose()
    }
}

enum AccountKey<'a> {
    Id(Uuid),
    Text(&'a str),
}

fn to_account(row: AccountRow) -> Result<Account, StoreError> {
    Account::try_from(row)
        .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("Corrupt account row: {}", e)))
}

/// Translate unique-constraint violations into their logical error.
fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("accounts_email_key") => return StoreError::EmailTaken,
                Some("accounts_username_key") => return StoreError::UsernameTaken,
                Some("account_identities_provider_subject_key") => {
                    return StoreError::IdentityTaken
                }
                _ => {}
            }
        }
    }
    StoreError::from(err)
}

async fn insert_account<'e, E>(executor: E, account: &Account) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO accounts (account_id, email, username, password_hash, display_name, role_code, status_code, created_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(account.account_id)
    .bind(&account.email)
    .bind(&account.username)
    .bind(account.password_hash.as_ref().map(|h| h.as_str()))
    .bind(&account.display_name)
    .bind(account.role.as_str())
    .bind(account.status.as_str())
    .bind(account.created_utc)
    .bind(account.updated_utc)
    .execute(executor)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

async fn insert_identity<'e, E>(executor: E, identity: &LinkedIdentity) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO account_identities (identity_id, account_id, provider_code, subject, created_utc)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(identity.identity_id)
    .bind(identity.account_id)
    .bind(&identity.provider_code)
    .bind(&identity.subject)
    .bind(identity.created_utc)
    .execute(executor)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

#[async_trait]
impl SessionStore for Database {
    async fn create(
        &self,
        account_id: Uuid,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        let session = Session::new(account_id, refresh_token, expires_utc);

        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_id, account_id, token_hash, previous_token_hash, expires_utc, created_utc, rotated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.session_id)
        .bind(session.account_id)
        .bind(&session.token_hash)
        .bind(&session.previous_token_hash)
        .bind(session.expires_utc)
        .bind(session.created_utc)
        .bind(session.rotated_utc)
        .execute(&self.pool)
        .await?;

        Ok(session.session_id)
    }

    async fn find_by_token(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM refresh_sessions WHERE token_hash = $1",
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn rotate(
        &self,
        session_id: Uuid,
        current_token: &str,
        new_token: &str,
        new_expires_utc: DateTime<Utc>,
    ) -> Result<Rotation, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET previous_token_hash = token_hash, token_hash = $3, expires_utc = $4, rotated_utc = NOW()
            WHERE session_id = $1 AND token_hash = $2
            "#,
        )
        .bind(session_id)
        .bind(hash_token(current_token))
        .bind(hash_token(new_token))
        .bind(new_expires_utc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Rotation::Rotated)
        } else {
            Ok(Rotation::NotFound)
        }
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_token(&self, refresh_token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE token_hash = $1")
            .bind(hash_token(refresh_token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_by_rotated_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM refresh_sessions WHERE previous_token_hash = $1",
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_utc < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccountDirectory for Database {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM accounts a WHERE a.account_id = $1", ACCOUNT_COLUMNS);
        self.fetch_account(&sql, AccountKey::Id(account_id)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM accounts a WHERE a.email = $1", ACCOUNT_COLUMNS);
        self.fetch_account(&sql, AccountKey::Text(email)).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM accounts a WHERE a.username = $1", ACCOUNT_COLUMNS);
        self.fetch_account(&sql, AccountKey::Text(username)).await
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        insert_account(&self.pool, account).await
    }

    async fn insert_federated(
        &self,
        account: &Account,
        identity: &LinkedIdentity,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        insert_account(&mut *tx, account).await?;
        insert_identity(&mut *tx, identity).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET status_code = $2, updated_utc = NOW() WHERE account_id = $1",
        )
        .bind(account_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_identity(
        &self,
        provider: IdentityProvider,
        subject: &str,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT {} FROM accounts a \
             JOIN account_identities i ON i.account_id = a.account_id \
             WHERE i.provider_code = $1 AND i.subject = $2",
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(provider.as_str())
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?
            .map(to_account)
            .transpose()
    }

    async fn link_identity(&self, identity: &LinkedIdentity) -> Result<(), StoreError> {
        insert_identity(&self.pool, identity).await
    }

    async fn list_identities(&self, account_id: Uuid) -> Result<Vec<LinkedIdentity>, StoreError> {
        let identities = sqlx::query_as::<_, LinkedIdentity>(
            "SELECT * FROM account_identities WHERE account_id = $1 ORDER BY created_utc",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(identities)
    }
}
