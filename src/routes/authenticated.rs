use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every handler here relies on the `AuthUser` middleware layered on by
/// `create_router`, which answers 401 (not a redirect) when the session is missing,
/// forged, expired, or belongs to a user that no longer exists.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        // The current identity, read back from the store.
        .route("/api/auth/me", get(handlers::get_me))
        // POST /api/auth/verify-email
        // Confirms the pending code for the signed-in user only.
        .route("/api/auth/verify-email", post(handlers::verify_email))
}
