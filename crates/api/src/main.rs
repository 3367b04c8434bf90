use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use glossa_core::corpus::Corpus;
use glossa_core::memory::InMemoryStore;
use glossa_core::nlp::lexicon::LexiconAnalyzer;
use glossa_core::nlp::Analyzer;
use glossa_core::store::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glossa_api::analyzer_client::HttpAnalyzer;
use glossa_api::config::{ServerConfig, StoreBackend};
use glossa_api::router::build_app_router;
use glossa_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glossa_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        backend = ?config.store_backend,
        "Loaded server configuration"
    );

    // --- Store ---
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set");

            let pool = glossa_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            glossa_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            glossa_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(glossa_db::PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(InMemoryStore::new())
        }
    };

    let counter = Corpus::new(Arc::clone(&store))
        .rehydrate_counter()
        .await
        .expect("Failed to check corpus counter");
    tracing::info!(counter, "Corpus counter ready");

    // --- Analyzer ---
    let analyzer: Arc<dyn Analyzer> = match &config.analyzer_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .expect("Failed to build analyzer HTTP client");
            tracing::info!(url = %url, "Using remote analyzer");
            Arc::new(HttpAnalyzer::with_client(client, url.clone()))
        }
        None => {
            let lexicon = match &config.lexicon_path {
                Some(path) => LexiconAnalyzer::new()
                    .with_lexicon_file(path)
                    .expect("Failed to load LEXICON_PATH"),
                None => LexiconAnalyzer::new(),
            };
            tracing::info!(extended = config.lexicon_path.is_some(), "Using built-in lexicon analyzer");
            Arc::new(lexicon)
        }
    };

    // --- App state + router ---
    let state = AppState::new(store, analyzer, config.clone());
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
