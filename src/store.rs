//! Persistence seams used by the session guard and the login flow.
//!
//! The guard only ever talks to these traits, so the backing store is chosen
//! at startup and handed in explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        session::Session,
        user::{User, UserRole},
    },
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, AppError>;
    async fn insert(&self, session: &Session) -> Result<(), AppError>;
    /// Returns whether a session row was removed.
    async fn delete(&self, token: &str) -> Result<bool, AppError>;
    /// Drops every session with `expires_at <= now` and returns how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn insert(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, AppError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(session)
    }

    async fn insert(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE julianday(expires_at) <= julianday(?1)")
                .bind(now)
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, password_hash, role, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (email, name, password_hash, role, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               RETURNING id, email, name, password_hash, role, created_at"#,
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }
}
