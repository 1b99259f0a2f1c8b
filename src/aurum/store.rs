//! Credential store: user identity, password hash and verification flag.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{Instrument, info_span};

#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verified: bool,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .finish()
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .field("verified", &self.verified)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for users. Emails are unique and compared as stored.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert an unverified user.
    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Mark the user verified. Returns `false` when no row matched.
    async fn set_verified(&self, email: &str) -> Result<bool, StoreError>;
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert_user(&self, user: &NewUser) -> Result<(), StoreError> {
        let query = "INSERT INTO users (name, email, password, verified) VALUES ($1, $2, $3, FALSE)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        match sqlx::query(query)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate),
            Err(err) => Err(StoreError::Database(err)),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = "SELECT name, email, password, verified FROM users WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| UserRecord {
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password"),
            verified: row.get("verified"),
        }))
    }

    async fn set_verified(&self, email: &str) -> Result<bool, StoreError> {
        let query = "UPDATE users SET verified = TRUE WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
