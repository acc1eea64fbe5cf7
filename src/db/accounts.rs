use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account not found")]
    NotFound,
    #[error("handle or email already registered")]
    DuplicateIdentity,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Full row, credential and session columns included. Deliberately not
/// `Serialize`; responses go through [`PublicAccount`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub avatar_key: String,
    pub cover_url: Option<String>,
    pub cover_key: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response-safe projection of an account. The password hash and refresh
/// token never appear here, so they cannot leak through serialization.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PublicAccount {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: String,
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub handle: &'a str,
    pub email: &'a str,
    pub display_name: &'a str,
    pub password_hash: &'a str,
    pub avatar_url: &'a str,
    pub avatar_key: &'a str,
    pub cover_url: Option<&'a str>,
    pub cover_key: Option<&'a str>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: NewAccount<'_>) -> Result<Uuid, AccountError>;

    /// Resolves by handle (case-insensitive) or email (exact).
    async fn find_by_identifier(&self, identifier: &str) -> Result<Account, AccountError>;

    async fn fetch_public(&self, id: Uuid) -> Result<PublicAccount, AccountError>;

    async fn identity_taken(&self, handle: &str, email: &str) -> Result<bool, AccountError>;

    async fn current_refresh_token(&self, id: Uuid) -> Result<Option<String>, AccountError>;

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AccountError>;

    /// Conditional update: installs `next` only while the stored token still
    /// equals `current`. Returns false when another writer got there first.
    async fn swap_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, AccountError>;
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, account: NewAccount<'_>) -> Result<Uuid, AccountError> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts
                (id, handle, email, display_name, password_hash,
                 avatar_url, avatar_key, cover_url, cover_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(account.handle)
        .bind(account.email)
        .bind(account.display_name)
        .bind(account.password_hash)
        .bind(account.avatar_url)
        .bind(account.avatar_key)
        .bind(account.cover_url)
        .bind(account.cover_key)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AccountError::DuplicateIdentity)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Account, AccountError> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, handle, email, display_name, password_hash,
                   avatar_url, avatar_key, cover_url, cover_key,
                   refresh_token, created_at, updated_at
            FROM accounts
            WHERE handle = lower($1) OR email = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::NotFound)
    }

    async fn fetch_public(&self, id: Uuid) -> Result<PublicAccount, AccountError> {
        sqlx::query_as::<_, PublicAccount>(
            r#"
            SELECT id, handle, email, display_name, avatar_url, cover_url, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::NotFound)
    }

    async fn identity_taken(&self, handle: &str, email: &str) -> Result<bool, AccountError> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE handle = $1 OR email = $2)",
        )
        .bind(handle)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn current_refresh_token(&self, id: Uuid) -> Result<Option<String>, AccountError> {
        sqlx::query_scalar::<_, Option<String>>(
            "SELECT refresh_token FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AccountError::NotFound)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), AccountError> {
        let result = sqlx::query("UPDATE accounts SET refresh_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, AccountError> {
        let result = sqlx::query(
            "UPDATE accounts SET refresh_token = $3 WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id)
        .bind(current)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

impl Account {
    pub fn public(&self) -> PublicAccount {
        PublicAccount {
            id: self.id,
            handle: self.handle.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            cover_url: self.cover_url.clone(),
            created_at: self.created_at,
        }
    }
}
