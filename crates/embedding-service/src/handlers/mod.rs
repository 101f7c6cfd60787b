//! HTTP handlers

pub mod embed;
pub mod health;
pub mod rerank;

use crate::error::ServiceError;

/// Run blocking inference on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Inference(anyhow::anyhow!("Inference task panicked: {}", e)))?
        .map_err(ServiceError::Inference)
}
