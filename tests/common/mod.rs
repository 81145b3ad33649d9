#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use property_tracker::{
    AppConfig, AppState, MockNotifier,
    models::{NewUser, UserRecord},
    password::hash_password,
    repository::{Repository, RepositoryError},
    session::{Identity, Role, SessionCodec},
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-session-secret";

// --- In-memory Repository ---

#[derive(Default, Clone)]
pub struct MockRepo {
    pub users: Arc<Mutex<Vec<UserRecord>>>,
    /// When set, `create_user` fails as if the database were down.
    pub fail_writes: bool,
}

impl MockRepo {
    pub fn with_users(users: Vec<UserRecord>) -> Self {
        Self {
            users: Arc::new(Mutex::new(users)),
            fail_writes: false,
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Vec<UserRecord> {
        self.users.lock().unwrap().clone()
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_user(&self, id: Uuid) -> Option<UserRecord> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        if self.fail_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            phone_e164: user.phone_e164,
            role: user.role.as_str().to_string(),
            password_hash: user.password_hash,
            verified: false,
            verification_code: Some(user.verification_code),
            verification_expires_at: Some(user.verification_expires_at),
            verification_attempts: 0,
            created_at: Utc::now(),
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn record_verification_attempt(&self, id: Uuid) -> Option<UserRecord> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.verification_code.is_some())?;
        user.verification_attempts += 1;
        Some(user.clone())
    }

    async fn mark_verified(&self, id: Uuid) -> Option<UserRecord> {
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id)?;
        user.verified = true;
        user.verification_code = None;
        user.verification_expires_at = None;
        user.verification_attempts = 0;
        Some(user.clone())
    }
}

// --- Builders ---

pub fn test_config() -> AppConfig {
    AppConfig {
        session_secret: TEST_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn test_state(repo: MockRepo, notifier: MockNotifier) -> AppState {
    AppState::new(Arc::new(repo), Arc::new(notifier), test_config())
}

pub fn codec() -> SessionCodec {
    SessionCodec::new(TEST_SECRET)
}

pub fn identity(role: Role) -> Identity {
    Identity {
        user_id: Uuid::from_u128(42).to_string(),
        role,
        email: "ana@example.com".to_string(),
        name: "Ana".to_string(),
        phone_e164: None,
        verified: true,
    }
}

pub fn token_for(role: Role) -> String {
    codec().encode(&identity(role)).unwrap()
}

/// A stored user whose password is `password`.
pub fn stored_user(email: &str, password: &str, role: Role) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: "Stored User".to_string(),
        phone_e164: None,
        role: role.as_str().to_string(),
        password_hash: hash_password(password).unwrap(),
        verified: false,
        verification_code: Some("123456".to_string()),
        verification_expires_at: Some(Utc::now() + Duration::minutes(15)),
        verification_attempts: 0,
        created_at: Utc::now(),
    }
}

/// A signed session cookie header value for a stored user.
pub fn cookie_for(record: &UserRecord) -> String {
    let identity = record.identity().unwrap();
    format!("session={}", codec().encode(&identity).unwrap())
}
