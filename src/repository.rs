use crate::models::{NewUser, UserRecord};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for the persistence operations the session layer needs. Handlers
/// and the `AuthUser` extractor only ever see `Arc<dyn Repository>`, so tests swap in
/// an in-memory implementation.
///
/// Lookups log database failures and surface them as `None`; callers map that to an
/// HTTP status. Registration is the exception, since a taken email and a broken
/// database need different answers.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Option<UserRecord>;
    // Email must already be normalized.
    async fn find_user_by_email(&self, email: &str) -> Option<UserRecord>;
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError>;
    // Counts one attempt against the pending code and returns the updated row.
    // None when the user is gone or has no pending code.
    async fn record_verification_attempt(&self, id: Uuid) -> Option<UserRecord>;
    // Sets `verified` and clears the pending code, its expiry and the attempt counter.
    async fn mark_verified(&self, id: Uuid) -> Option<UserRecord>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("email already registered")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const SELECT_BY_ID: &str = "SELECT id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at FROM users WHERE id = $1";

const SELECT_BY_EMAIL: &str = "SELECT id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at FROM users WHERE email = $1";

const INSERT_USER: &str = r#"
    INSERT INTO users (id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8, 0, NOW())
    ON CONFLICT (email) DO NOTHING
    RETURNING id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at
"#;

const RECORD_VERIFICATION_ATTEMPT: &str = r#"
    UPDATE users SET verification_attempts = verification_attempts + 1
    WHERE id = $1 AND verification_code IS NOT NULL
    RETURNING id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at
"#;

const MARK_VERIFIED: &str = r#"
    UPDATE users
    SET verified = true, verification_code = NULL, verification_expires_at = NULL, verification_attempts = 0
    WHERE id = $1
    RETURNING id, email, name, phone_e164, role, password_hash, verified, verification_code, verification_expires_at, verification_attempts, created_at
"#;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are checked at runtime so the crate
/// builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `users` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                phone_e164 TEXT,
                role TEXT NOT NULL CHECK (role IN ('USER', 'BROKER', 'ADMIN')),
                password_hash TEXT NOT NULL,
                verified BOOLEAN NOT NULL DEFAULT false,
                verification_code TEXT,
                verification_expires_at TIMESTAMPTZ,
                verification_attempts INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Tables created before codes expired or counted attempts.
        sqlx::query(
            r#"
            ALTER TABLE users
                ADD COLUMN IF NOT EXISTS verification_expires_at TIMESTAMPTZ,
                ADD COLUMN IF NOT EXISTS verification_attempts INTEGER NOT NULL DEFAULT 0
            "#,
        )
        .execute(&self.pool)
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<UserRecord> {
        sqlx::query_as::<_, UserRecord>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        sqlx::query_as::<_, UserRecord>(SELECT_BY_EMAIL)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("find_user_by_email error: {:?}", e);
                None
            })
    }

    /// create_user
    ///
    /// `ON CONFLICT DO NOTHING` turns a duplicate email into zero returned rows.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(INSERT_USER)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.phone_e164)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .bind(&user.verification_code)
            .bind(user.verification_expires_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::Conflict)
    }

    async fn record_verification_attempt(&self, id: Uuid) -> Option<UserRecord> {
        sqlx::query_as::<_, UserRecord>(RECORD_VERIFICATION_ATTEMPT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("record_verification_attempt error: {:?}", e);
                None
            })
    }

    async fn mark_verified(&self, id: Uuid) -> Option<UserRecord> {
        sqlx::query_as::<_, UserRecord>(MARK_VERIFIED)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("mark_verified error: {:?}", e);
                None
            })
    }
}
