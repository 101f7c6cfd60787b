//! Embedding service library: exposes the service components for the binary
//! and for integration tests.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod loader;
pub mod models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::cache::{DefaultModels, LoadOptions, ModelCache};
use crate::config::ServiceConfig;
use crate::extract::OutputExtractor;
use crate::loader::ModelLoader;

// Re-export key types for convenience
pub use cache::CacheError;
pub use error::ServiceError;
pub use models::{Embedder, LoadedModel, ModelKind, Reranker};

/// Shared application state
pub struct AppState {
    pub config: ServiceConfig,
    pub cache: ModelCache,
    pub extractor: OutputExtractor,
}

impl AppState {
    pub fn new(config: ServiceConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let cache = ModelCache::new(
            loader,
            DefaultModels {
                embed: config.default_embed_model.clone(),
                rerank: config.default_rerank_model.clone(),
            },
            LoadOptions {
                cache_dir: config.cache_dir.clone(),
                use_fp16: config.use_fp16,
            },
        );

        Self {
            config,
            cache,
            extractor: OutputExtractor::default(),
        }
    }
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::handler))
        .route("/embed", post(handlers::embed::embed))
        .route("/embed_batch", post(handlers::embed::embed_batch))
        .route("/rerank", post(handlers::rerank::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
