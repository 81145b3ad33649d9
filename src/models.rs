use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::{Identity, Role};

// --- Core Application Schemas (Mapped to Database) ---

/// UserRecord
///
/// A row of the `users` table. Never serialized to clients: it carries the password
/// hash and the pending verification code. Clients see [`Identity`] instead.
#[derive(Debug, Clone, FromRow)]
#[cfg_attr(test, derive(Default))]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone_e164: Option<String>,
    // 'USER' | 'BROKER' | 'ADMIN'. Stored as text.
    pub role: String,
    pub password_hash: String,
    pub verified: bool,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    // Wrong and right guesses alike; reset when a new code is issued.
    pub verification_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// identity
    ///
    /// Projects the stored row into the session payload. Returns None when the stored
    /// role is outside the known set, so a corrupt row can never mint a session.
    pub fn identity(&self) -> Option<Identity> {
        let role = match self.role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                tracing::error!(user_id = %self.id, "refusing to issue session: {e}");
                return None;
            }
        };
        Some(Identity {
            user_id: self.id.to_string(),
            role,
            email: self.email.clone(),
            name: self.name.clone(),
            phone_e164: self.phone_e164.clone(),
            verified: self.verified,
        })
    }
}

/// Result of checking a submitted verification code against the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    /// Already verified, or no code was ever issued.
    NothingPending,
    TooManyAttempts,
    Expired,
    Mismatch,
}

impl UserRecord {
    /// check_verification_code
    ///
    /// `verification_attempts` must already count this attempt. The cap is checked
    /// before the code itself, so a locked-out row rejects even the right code.
    pub fn check_verification_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
        max_attempts: i32,
    ) -> CodeCheck {
        let Some(expected) = self.verification_code.as_deref() else {
            return CodeCheck::NothingPending;
        };
        if self.verified {
            return CodeCheck::NothingPending;
        }
        if self.verification_attempts > max_attempts {
            return CodeCheck::TooManyAttempts;
        }
        match self.verification_expires_at {
            Some(expires_at) if expires_at > now => {}
            _ => return CodeCheck::Expired,
        }
        if expected == code {
            CodeCheck::Accepted
        } else {
            CodeCheck::Mismatch
        }
    }
}

/// NewUser
///
/// Validated input handed to the repository on registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone_e164: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub verification_code: String,
    pub verification_expires_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for POST /api/auth/register. The password is hashed before it
/// reaches the repository and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterRequest {
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    #[schema(example = "+5511999998888")]
    pub phone_e164: Option<String>,
    /// USER or BROKER. Defaults to USER; ADMIN cannot be self-assigned.
    #[serde(default)]
    pub role: Option<Role>,
}

/// LoginRequest
///
/// Input payload for POST /api/auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// VerifyEmailRequest
///
/// Input payload for POST /api/auth/verify-email. `code` is the six-digit value sent
/// at registration. The account comes from the caller's session, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyEmailRequest {
    #[schema(example = "042917")]
    pub code: String,
}

/// Lower-cased, trimmed form under which emails are stored and looked up.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// E.164: a `+` followed by 8 to 15 digits, the first of which is not zero.
pub fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}
