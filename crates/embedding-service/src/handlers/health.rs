use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::models::ModelKind;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Currently bound embedding model, if any
    pub embed_model: Option<String>,
    /// Currently bound reranking model, if any
    pub rerank_model: Option<String>,
}

/// Handler for `GET /health`
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        embed_model: state.cache.loaded_name(ModelKind::Embed).await,
        rerank_model: state.cache.loaded_name(ModelKind::Rerank).await,
    })
}
