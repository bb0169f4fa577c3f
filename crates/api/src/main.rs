use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use memoria_core::queue::Broker;
use memoria_core::store::{JobStore, MediaCatalog};
use memoria_db::{MemoryBroker, MemoryStore, PgAnimationStore, PgBroker};
use memoria_provider::{ProviderConfig, ProviderRegistry};
use memoria_worker::{shutdown_signal, AnimationWorker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoria_api::config::ServerConfig;
use memoria_api::router::build_app_router;
use memoria_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memoria_api=debug,memoria_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let provider_config = ProviderConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        default_provider = %provider_config.default_provider(),
        "Loaded server configuration",
    );

    let providers =
        ProviderRegistry::from_config(&provider_config).expect("Failed to build provider HTTP client");

    // --- Storage and queue ---
    let (store, media, broker, run_worker): (
        Arc<dyn JobStore>,
        Arc<dyn MediaCatalog>,
        Arc<dyn Broker>,
        bool,
    ) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = memoria_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            memoria_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            memoria_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let store = Arc::new(PgAnimationStore::new(pool.clone()));
            (
                store.clone(),
                store,
                Arc::new(PgBroker::new(pool)),
                config.embedded_worker,
            )
        }
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set; using the in-memory store with an embedded worker. \
                 Jobs are lost on restart.",
            );
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store, Arc::new(MemoryBroker::new()), true)
        }
    };

    // --- Embedded worker ---
    let worker_cancel = CancellationToken::new();
    let worker_handle = run_worker.then(|| {
        let worker = AnimationWorker::new(
            Arc::clone(&store),
            Arc::clone(&broker),
            providers.clone(),
            WorkerConfig::from_env(),
        );
        let cancel = worker_cancel.clone();
        tracing::info!("Starting embedded animation worker");
        tokio::spawn(async move { worker.run(cancel).await })
    });

    // --- App state and router ---
    let state = AppState::new(
        config.clone(),
        store,
        media,
        broker,
        providers,
        Duration::from_secs(provider_config.timeout_secs),
    );
    let app = build_app_router(state);

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
        .with_graceful_shutdown(async {
            shutdown_signal().await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Some(handle) = worker_handle {
        worker_cancel.cancel();
        let drain = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(drain, handle).await.is_err() {
            tracing::warn!("Embedded worker did not drain in time; leases will expire");
        }
        tracing::info!("Embedded worker stopped");
    }

    tracing::info!("Graceful shutdown complete");
}
