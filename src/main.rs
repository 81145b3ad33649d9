use property_tracker::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    notifier::{EvolutionNotifier, LoggingNotifier, NotifierState},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database and the notifier, then serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging. RUST_LOG wins over the defaults below.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "property_tracker=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .ensure_schema()
        .await
        .expect("FATAL: Failed to prepare the users table.");
    let repo = Arc::new(postgres) as RepositoryState;

    // 4. WhatsApp delivery. Without Evolution settings, messages are only logged.
    let notifier = match config.evolution.clone() {
        Some(evolution) => {
            tracing::info!(instance = %evolution.instance, "WhatsApp delivery via Evolution API");
            Arc::new(EvolutionNotifier::new(evolution)) as NotifierState
        }
        None => {
            tracing::warn!("EVOLUTION_API_* not set; WhatsApp messages will only be logged");
            Arc::new(LoggingNotifier) as NotifierState
        }
    };

    // 5. Router and server.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, notifier, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
