//! HTTP service for dense/sparse embeddings and reranking
//!
//! Provides:
//! - `POST /embed` and `POST /embed_batch` for dense + sparse vectors
//! - `POST /rerank` for cross-encoder reranking
//! - `GET /health` reporting the currently loaded models
//!
//! Models are loaded on first use and swapped when a request names a
//! different one.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use embedding_service::config::ServiceConfig;
use embedding_service::loader::HubLoader;
use embedding_service::{router, AppState, ModelKind};

#[derive(Parser, Debug)]
#[command(name = "embedding-service")]
#[command(about = "Dense/sparse embedding and reranking service")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 8000, env = "EMBED_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "EMBED_BIND")]
    bind: String,

    /// Path to a JSON config file
    #[arg(long, env = "EMBED_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to download models to (overrides the config file)
    #[arg(long, env = "EMBED_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Load the default models before accepting requests
    #[arg(long)]
    preload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "embedding_service=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    tracing::info!("Model cache directory: {}", config.cache_dir.display());

    let loader = Arc::new(HubLoader::new(
        config.hub_url.clone(),
        config.max_sequence_length,
    ));
    let state = Arc::new(AppState::new(config, loader));

    if cli.preload {
        for kind in [ModelKind::Embed, ModelKind::Rerank] {
            // Failures are logged by the cache; the model is retried on first use
            let _ = state.cache.ensure(kind, None, None).await;
        }
    }

    let app = router(Arc::clone(&state));

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting embedding-service on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Embedding service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
