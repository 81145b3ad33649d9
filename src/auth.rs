use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use uuid::Uuid;

use crate::{
    GateState,
    models::UserRecord,
    repository::RepositoryState,
    session::{Identity, read_session_cookies},
};

/// AuthUser Extractor Result
///
/// The resolved identity of an API request. Built from the stored user record rather
/// than the cookie payload, so role or verification changes apply on the next request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub identity: Identity,
}

/// AuthUser Extractor Implementation
///
/// API routes live under a public prefix, so the session gate lets them through; this
/// extractor is what actually guards them.
///
/// 1. Read every `session` cookie and keep the first whose signature and expiry check out.
/// 2. Parse the user id and confirm the user still exists.
///
/// Rejection: `StatusCode::UNAUTHORIZED` on any failure. API callers get a status,
/// not a redirect.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    GateState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let gate = GateState::from_ref(state);

        let raw = read_session_cookies(&parts.headers);
        let candidates: Vec<&str> = raw.iter().map(String::as_str).collect();
        let claimed = gate
            .codec()
            .decode_first(&candidates)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        let user_id = Uuid::parse_str(&claimed.user_id).map_err(|_| StatusCode::UNAUTHORIZED)?;

        // A deleted user keeps a validly signed cookie until it expires.
        let user: UserRecord = repo
            .get_user(user_id)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let identity = user.identity().ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            id: user.id,
            identity,
        })
    }
}
