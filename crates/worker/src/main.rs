use std::sync::Arc;

use memoria_db::{PgAnimationStore, PgBroker};
use memoria_provider::{ProviderConfig, ProviderRegistry};
use memoria_worker::{shutdown_signal, AnimationWorker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memoria_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    let provider_config = ProviderConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        default_provider = %provider_config.default_provider(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = memoria_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    memoria_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    // --- Providers ---
    let providers =
        ProviderRegistry::from_config(&provider_config).expect("Failed to build provider HTTP client");

    let worker = AnimationWorker::new(
        Arc::new(PgAnimationStore::new(pool.clone())),
        Arc::new(PgBroker::new(pool)),
        providers,
        config,
    );

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Finishing in-flight jobs");
        shutdown.cancel();
    });

    worker.run(cancel).await;
    tracing::info!("Worker stopped");
}
