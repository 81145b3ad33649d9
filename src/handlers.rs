use crate::{
    AppState,
    auth::AuthUser,
    models::{
        CodeCheck, LoginRequest, NewUser, RegisterRequest, VerifyEmailRequest, is_e164,
        normalize_email,
    },
    password::{hash_password, verify_password},
    repository::RepositoryError,
    session::{Identity, Role, removal_cookies, session_cookie},
};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use chrono::{Duration, Utc};
use rand::Rng;

/// Minimum accepted password length at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// How long a verification code stays usable after it is issued.
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 15;

/// Submissions allowed per issued code.
pub const MAX_VERIFICATION_ATTEMPTS: i32 = 5;

// --- Helpers ---

/// issue_session
///
/// Signs `identity` and returns it as the JSON body alongside the `Set-Cookie` header.
fn issue_session(
    state: &AppState,
    identity: Identity,
    status: StatusCode,
) -> Result<Response, StatusCode> {
    let token = state.gate.codec().encode(&identity).map_err(|e| {
        tracing::error!("failed to sign session: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let cookie = session_cookie(token, state.config.secure_cookies());

    Ok((
        status,
        AppendHeaders([(header::SET_COOKIE, cookie.to_string())]),
        Json(identity),
    )
        .into_response())
}

fn verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

// --- Handlers ---

/// register_user
///
/// [Public Route] Creates an account and signs the new user in.
///
/// Brokers may self-register; admins are provisioned out of band. When a phone number
/// is given the verification code is sent over WhatsApp in the background, and a failed
/// delivery never fails the registration.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered and signed in", body = Identity),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Account could not be stored")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, StatusCode> {
    let email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();
    if !email.contains('@') || name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let phone_e164 = payload
        .phone_e164
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    if phone_e164.as_deref().is_some_and(|p| !is_e164(p)) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let role = match payload.role.unwrap_or(Role::User) {
        Role::Admin => return Err(StatusCode::BAD_REQUEST),
        role => role,
    };

    if state.repo.find_user_by_email(&email).await.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        tracing::error!("{e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let code = verification_code();

    let record = state
        .repo
        .create_user(NewUser {
            email,
            name,
            phone_e164: phone_e164.clone(),
            role,
            password_hash,
            verification_code: code.clone(),
            verification_expires_at: Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
        })
        .await
        .map_err(|e| match e {
            // Lost a race against a concurrent registration with the same email.
            RepositoryError::Conflict => StatusCode::CONFLICT,
            RepositoryError::Database(e) => {
                tracing::error!("create_user error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    tracing::info!(user_id = %record.id, role = %role, "user registered");

    if let Some(phone) = phone_e164 {
        let notifier = state.notifier.clone();
        let user_id = record.id;
        tokio::spawn(async move {
            let text = format!("Your verification code is {code}");
            if !notifier.send_text(&phone, &text).await {
                tracing::warn!(%user_id, "verification code was not delivered");
            }
        });
    }

    let identity = record
        .identity()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    issue_session(&state, identity, StatusCode::CREATED)
}

/// login
///
/// [Public Route] Exchanges email + password for a session cookie.
///
/// Unknown email and wrong password are indistinguishable (both 401).
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = Identity),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, StatusCode> {
    let email = normalize_email(&payload.email);
    let user = state
        .repo
        .find_user_by_email(&email)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let matches = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        tracing::error!(user_id = %user.id, "{e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if !matches {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let identity = user.identity().ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    issue_session(&state, identity, StatusCode::OK)
}

/// logout
///
/// [Public Route] Clears the session cookie under every path it was ever scoped to.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookies: Vec<_> = removal_cookies(&state.config.cookie_paths, state.config.secure_cookies())
        .into_iter()
        .map(|cookie| (header::SET_COOKIE, cookie.to_string()))
        .collect();

    (StatusCode::NO_CONTENT, AppendHeaders(cookies))
}

/// verify_email
///
/// [Authenticated Route] Confirms the six-digit code sent at registration for the
/// signed-in user and reissues the session with `verified = true`.
///
/// Every submission counts against the code, right or wrong. Past
/// [`MAX_VERIFICATION_ATTEMPTS`] the code is dead and the answer is 429.
#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Verified", body = Identity),
        (status = 400, description = "Wrong or expired code, or nothing to verify"),
        (status = 401, description = "No valid session"),
        (status = 429, description = "Too many attempts for this code")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Response, StatusCode> {
    let user = state
        .repo
        .record_verification_attempt(auth_user.id)
        .await
        .ok_or(StatusCode::BAD_REQUEST)?;

    match user.check_verification_code(
        payload.code.trim(),
        Utc::now(),
        MAX_VERIFICATION_ATTEMPTS,
    ) {
        CodeCheck::Accepted => {}
        CodeCheck::TooManyAttempts => {
            tracing::warn!(user_id = %user.id, "verification attempts exhausted");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
        outcome => {
            tracing::debug!(user_id = %user.id, ?outcome, "verification code rejected");
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let user = state
        .repo
        .mark_verified(user.id)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    tracing::info!(user_id = %user.id, "email verified");

    let identity = user.identity().ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    issue_session(&state, identity, StatusCode::OK)
}

/// get_me
///
/// [Authenticated Route] Returns the current identity as stored, not as the cookie claims it.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "No valid session")
    )
)]
pub async fn get_me(AuthUser { identity, .. }: AuthUser) -> Json<Identity> {
    Json(identity)
}
