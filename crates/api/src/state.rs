use std::sync::Arc;
use std::time::Duration;

use memoria_core::queue::Broker;
use memoria_core::store::{JobStore, MediaCatalog};
use memoria_provider::ProviderRegistry;

use crate::config::ServerConfig;
use crate::engine::{AnimationDispatcher, StatusService};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job store, also used by the health check.
    pub store: Arc<dyn JobStore>,
    pub dispatcher: Arc<AnimationDispatcher>,
    pub status: Arc<StatusService>,
}

impl AppState {
    /// Wire the dispatch and status engines over the given backends.
    ///
    /// `upstream_timeout` bounds the single provider call the status
    /// endpoint may make for an untracked handle.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        media: Arc<dyn MediaCatalog>,
        broker: Arc<dyn Broker>,
        providers: ProviderRegistry,
        upstream_timeout: Duration,
    ) -> Self {
        let dispatcher = AnimationDispatcher::new(
            Arc::clone(&store),
            media,
            broker,
            providers.clone(),
            config.public_api_url.clone(),
        );
        let status = StatusService::new(Arc::clone(&store), providers, upstream_timeout);

        Self {
            config: Arc::new(config),
            store,
            dispatcher: Arc::new(dispatcher),
            status: Arc::new(status),
        }
    }
}
