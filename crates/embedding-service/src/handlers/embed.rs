//! Dense + sparse embedding endpoints
//!
//! Handles:
//! - `POST /embed` for a single text
//! - `POST /embed_batch` for a list of texts

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::error::ServiceError;
use crate::extract::{OutputExtractor, SparseVector};
use crate::models::Embedder;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub text: String,

    /// Model to use (default embedding model when absent)
    #[serde(default)]
    pub model_name: Option<String>,

    /// Download directory for this load only
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

#[derive(Debug, Deserialize)]
pub struct EmbedBatchRequest {
    pub texts: Vec<String>,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmbedBatchResponse {
    pub dense: Vec<Vec<f32>>,
    pub sparse: Vec<SparseVector>,
}

/// Handler for `POST /embed`
pub async fn embed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ServiceError> {
    let options = state.cache.options_for(request.cache_dir.as_deref());
    let model = state
        .cache
        .ensure_embedder(request.model_name.as_deref(), Some(options))
        .await?;

    let text = request.text;
    let response = run_blocking(move || embed_single(model.as_ref(), &state.extractor, text)).await?;
    Ok(Json(response))
}

/// Handler for `POST /embed_batch`
pub async fn embed_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbedBatchRequest>,
) -> Result<Json<EmbedBatchResponse>, ServiceError> {
    if request.texts.is_empty() {
        return Ok(Json(EmbedBatchResponse::default()));
    }

    let limit = state.config.max_batch_size;
    if request.texts.len() > limit {
        return Err(ServiceError::BadRequest(format!(
            "Batch of {} texts exceeds the limit of {}",
            request.texts.len(),
            limit
        )));
    }

    let options = state.cache.options_for(request.cache_dir.as_deref());
    let model = state
        .cache
        .ensure_embedder(request.model_name.as_deref(), Some(options))
        .await?;

    let texts = request.texts;
    let response = run_blocking(move || embed_many(model.as_ref(), &state.extractor, &texts)).await?;
    Ok(Json(response))
}

/// Embed one text, retrying with the non-query encoder when the query
/// output has no dense vector.
pub fn embed_single(
    model: &dyn Embedder,
    extractor: &OutputExtractor,
    text: String,
) -> anyhow::Result<EmbedResponse> {
    let texts = vec![text];

    let raw = model.encode_queries(&texts)?;
    let mut dense = extractor.dense(&raw).and_then(|rows| rows.into_iter().next());
    let mut sparse = extractor.sparse(&raw);

    if dense.is_none() {
        tracing::warn!("No dense vector in query output, retrying with plain encode");
        let raw = model.encode(&texts)?;
        dense = extractor.dense(&raw).and_then(|rows| rows.into_iter().next());
        sparse = extractor.sparse(&raw);
    }

    if dense.is_none() {
        tracing::warn!("No dense vector found in model output, returning empty vector");
    }

    Ok(EmbedResponse {
        dense: dense.unwrap_or_default(),
        sparse: sparse
            .and_then(|entries| entries.into_iter().next())
            .unwrap_or_default(),
    })
}

/// Embed many texts. Missing sparse entries are filled with empty vectors so
/// that `sparse` lines up with the input.
pub fn embed_many(
    model: &dyn Embedder,
    extractor: &OutputExtractor,
    texts: &[String],
) -> anyhow::Result<EmbedBatchResponse> {
    let raw = model.encode_queries(texts)?;

    let dense = extractor.dense(&raw).unwrap_or_else(|| {
        tracing::warn!("No dense vectors found in model output");
        Vec::new()
    });

    let mut sparse = extractor.sparse(&raw).unwrap_or_else(|| {
        tracing::warn!("No sparse vectors found in model output");
        Vec::new()
    });
    if sparse.len() < texts.len() {
        sparse.resize(texts.len(), SparseVector::default());
    }

    Ok(EmbedBatchResponse { dense, sparse })
}
