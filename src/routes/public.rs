use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. The auth endpoints are how a session
/// comes into existence (or goes away), so they cannot require one.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // Creates the account, sends the WhatsApp verification code, signs the user in.
        .route("/api/auth/register", post(handlers::register_user))
        // POST /api/auth/login
        .route("/api/auth/login", post(handlers::login))
        // POST /api/auth/logout
        // Idempotent: clearing an absent cookie is still a 204.
        .route("/api/auth/logout", post(handlers::logout))
}
