//! Rerank endpoint

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::error::ServiceError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RerankRequest {
    pub query: String,
    pub documents: Vec<String>,

    #[serde(default)]
    pub model_name: Option<String>,

    /// Keep only the best `top_k` results
    #[serde(default)]
    pub top_k: Option<usize>,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankItem {
    /// Position of the document in the request
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RerankResponse {
    pub results: Vec<RerankItem>,
}

/// Handler for `POST /rerank`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RerankRequest>,
) -> Result<Json<RerankResponse>, ServiceError> {
    if request.documents.is_empty() {
        return Ok(Json(RerankResponse::default()));
    }

    let options = state.cache.options_for(request.cache_dir.as_deref());
    let model = state
        .cache
        .ensure_reranker(request.model_name.as_deref(), Some(options))
        .await?;

    let document_count = request.documents.len();
    let pairs: Vec<(String, String)> = request
        .documents
        .into_iter()
        .map(|doc| (request.query.clone(), doc))
        .collect();

    let raw = run_blocking(move || model.compute_score(&pairs)).await?;

    let mut scores = state.extractor.scores(&raw).unwrap_or_else(|| {
        tracing::warn!("No scores found in reranker output");
        Vec::new()
    });
    if scores.len() != document_count {
        tracing::warn!(
            "Reranker returned {} scores for {} documents",
            scores.len(),
            document_count
        );
        scores.truncate(document_count);
    }

    Ok(Json(RerankResponse {
        results: rank(&scores, request.top_k),
    }))
}

/// Pair scores with their document index and sort by descending score.
///
/// Ties keep request order.
pub fn rank(scores: &[f32], top_k: Option<usize>) -> Vec<RerankItem> {
    let mut results: Vec<RerankItem> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| RerankItem { index, score })
        .collect();

    // Total order, so NaN scores cannot break the sort
    results.sort_by(|a, b| b.score.total_cmp(&a.score));

    if let Some(k) = top_k {
        results.truncate(k);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, score: f32) -> RerankItem {
        RerankItem { index, score }
    }

    #[test]
    fn test_rank_sorts_descending() {
        let results = rank(&[0.2, 0.9, 0.5], None);
        assert_eq!(results, vec![item(1, 0.9), item(2, 0.5), item(0, 0.2)]);
    }

    #[test]
    fn test_rank_top_k() {
        let results = rank(&[0.2, 0.9, 0.5], Some(2));
        assert_eq!(results, vec![item(1, 0.9), item(2, 0.5)]);

        // Larger than the result count keeps everything
        assert_eq!(rank(&[0.2, 0.9, 0.5], Some(10)).len(), 3);
        assert!(rank(&[0.2, 0.9, 0.5], Some(0)).is_empty());
    }

    #[test]
    fn test_rank_ties_keep_request_order() {
        let results = rank(&[1.0, 3.0, 1.0, 3.0], None);
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_rank_with_nan_score() {
        let results = rank(&[0.5, f32::NAN, 0.9, 0.1], None);
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();

        // NaN sorts above every number
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(&[], Some(3)).is_empty());
    }
}
