#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use memoria_core::media::{Media, MediaType};
use memoria_core::queue::Broker;
use memoria_core::store::{JobStore, MediaCatalog};
use memoria_core::types::DbId;
use memoria_db::{MemoryBroker, MemoryStore};
use memoria_provider::{ProviderConfig, ProviderRegistry};
use tower::ServiceExt;

use memoria_api::config::ServerConfig;
use memoria_api::router::build_app_router;
use memoria_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        public_api_url: Some("https://api.memoria.test".to_string()),
        embedded_worker: false,
    }
}

/// Provider configuration without credentials, defaulting to HeyGen.
pub fn test_provider_config() -> ProviderConfig {
    ProviderConfig {
        heygen_api_key: None,
        heygen_api_url: "https://api.heygen.com/v2".into(),
        did_api_key: None,
        did_api_url: "https://api.d-id.com".into(),
        did_webhook_url: None,
        use_heygen: true,
        voice_id: None,
        timeout_secs: 5,
    }
}

/// In-memory backends behind a test app.
pub struct TestBackends {
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            broker: Arc::new(MemoryBroker::new()),
        }
    }

    /// Add a photo that has not been animated yet.
    pub async fn add_photo(&self, id: DbId) {
        self.add_media(id, MediaType::Photo, false).await;
    }

    pub async fn add_media(&self, id: DbId, media_type: MediaType, is_animated: bool) {
        self.store
            .insert_media(Media {
                id,
                memorial_id: 1,
                file_name: format!("media-{id}.jpg"),
                file_url: None,
                media_type,
                is_animated,
                animation_url: is_animated.then(|| "https://cdn/old.mp4".to_string()),
            })
            .await;
    }

    /// Full application router over these backends, using `providers`.
    pub fn app_with(&self, providers: ProviderRegistry) -> Router {
        let state = AppState::new(
            test_config(),
            Arc::clone(&self.store) as Arc<dyn JobStore>,
            Arc::clone(&self.store) as Arc<dyn MediaCatalog>,
            Arc::clone(&self.broker) as Arc<dyn Broker>,
            providers,
            Duration::from_secs(5),
        );
        build_app_router(state)
    }

    /// Full application router with the real (unconfigured) provider adapters.
    pub fn app(&self) -> Router {
        let providers = ProviderRegistry::from_config(&test_provider_config()).unwrap();
        self.app_with(providers)
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
