use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod password;
pub mod repository;
pub mod session;

// Routing segregation (Public, Authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gate::{Decision, Gate, PathClass, PathClassifier, RouteRules};
pub use notifier::{LoggingNotifier, MockNotifier, NotifierState};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{DecodeError, Identity, Role, SessionCodec};

/// ApiDoc
///
/// OpenAPI document for the session endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout,
        handlers::verify_email, handlers::get_me
    ),
    components(
        schemas(
            session::Identity, session::Role, models::RegisterRequest,
            models::LoginRequest, models::VerifyEmailRequest,
        )
    ),
    tags(
        (name = "property-tracker", description = "Property tracker session API")
    )
)]
struct ApiDoc;

/// GateState
///
/// The shared, immutable session gate (path rules + session codec).
pub type GateState = Arc<Gate>;

/// AppState
///
/// Single, thread-safe container for every service the handlers need. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Outbound WhatsApp delivery.
    pub notifier: NotifierState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
    /// Built from `config.routes` and `config.session_secret`.
    pub gate: GateState,
}

impl AppState {
    pub fn new(repo: RepositoryState, notifier: NotifierState, config: AppConfig) -> Self {
        let gate = Arc::new(Gate::new(
            config.routes.clone(),
            SessionCodec::new(&config.session_secret),
        ));
        Self {
            repo,
            notifier,
            config,
            gate,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for NotifierState {
    fn from_ref(app_state: &AppState) -> NotifierState {
        app_state.notifier.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for GateState {
    fn from_ref(app_state: &AppState) -> GateState {
        app_state.gate.clone()
    }
}

/// session_gate
///
/// Page-level authorization applied to every route. Never rejects: a request either
/// proceeds or is redirected (missing session → login, USER in the broker area → home,
/// signed-in visitor on `/` or an auth page → their landing page).
async fn session_gate(State(gate): State<GateState>, request: Request, next: Next) -> Response {
    let raw = session::read_session_cookies(request.headers());
    let candidates: Vec<&str> = raw.iter().map(String::as_str).collect();
    match gate.authorize_candidates(request.uri().path(), &candidates) {
        Decision::Allow => next.run(request).await,
        Decision::RedirectTo(target) => {
            tracing::debug!(path = %request.uri().path(), %target, "session gate redirect");
            Redirect::temporary(&target).into_response()
        }
    }
}

/// auth_middleware
///
/// Enforces an API session on `authenticated_routes`. The `AuthUser` extractor rejects
/// with 401 before the handler runs when the cookie is missing, invalid or stale.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies the session gate and the observability
/// stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Page routes are served elsewhere; anything the gate lets through lands here.
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying method, URI and the `x-request-id` set above, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
