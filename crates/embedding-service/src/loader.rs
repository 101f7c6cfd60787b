//! Model construction: resolving a name to files and building the model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use semantic_embeddings::{CrossEncoder, M3Encoder, ModelFiles, Precision};
use serde_json::Value;

use crate::cache::LoadOptions;
use crate::download::{download_model, EMBEDDER_FILES, RERANKER_FILES};
use crate::models::{Embedder, LoadedModel, ModelKind, Reranker};

/// Builds model instances by name.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, kind: ModelKind, name: &str, options: &LoadOptions) -> Result<LoadedModel>;
}

/// Loads candle models from local directories or the Hugging Face hub.
pub struct HubLoader {
    hub_url: String,
    max_length: usize,
}

impl HubLoader {
    pub fn new(hub_url: impl Into<String>, max_length: usize) -> Self {
        Self {
            hub_url: hub_url.into(),
            max_length,
        }
    }

    /// Find the directory holding the model's files, downloading them if needed.
    async fn resolve_dir(&self, kind: ModelKind, name: &str, options: &LoadOptions) -> Result<PathBuf> {
        let local = Path::new(name);
        if local.is_dir() {
            tracing::debug!("Using local model directory {}", local.display());
            return Ok(local.to_path_buf());
        }

        validate_repo_id(name)?;

        let model_dir = options.cache_dir.join(repo_dir_name(name));
        let specs = match kind {
            ModelKind::Embed => EMBEDDER_FILES,
            ModelKind::Rerank => RERANKER_FILES,
        };
        download_model(&self.hub_url, name, &model_dir, specs).await
    }
}

#[async_trait]
impl ModelLoader for HubLoader {
    async fn load(&self, kind: ModelKind, name: &str, options: &LoadOptions) -> Result<LoadedModel> {
        let model_dir = self.resolve_dir(kind, name, options).await?;
        let precision = Precision::from_fp16(options.use_fp16);
        let max_length = self.max_length;

        // Weight loading is CPU and disk bound
        tokio::task::spawn_blocking(move || {
            let files = ModelFiles::from_dir(&model_dir)?;
            let model = match kind {
                ModelKind::Embed => {
                    let encoder = M3Encoder::load(&files, precision, max_length)?;
                    if !encoder.has_sparse_head() {
                        tracing::warn!(
                            "No sparse head in {}, sparse output will be empty",
                            model_dir.display()
                        );
                    }
                    LoadedModel::Embedder(Arc::new(CandleEmbedder(encoder)))
                }
                ModelKind::Rerank => {
                    let reranker = CrossEncoder::load(&files, precision, max_length)?;
                    LoadedModel::Reranker(Arc::new(CandleReranker(reranker)))
                }
            };
            Ok::<_, anyhow::Error>(model)
        })
        .await
        .context("Model construction task panicked")?
    }
}

/// Check that a name looks like a hub repository id (`org/name` or `name`).
pub fn validate_repo_id(name: &str) -> Result<()> {
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > 2 {
        anyhow::bail!("Invalid model name '{}': expected 'org/name' or a local directory", name);
    }

    for segment in segments {
        let valid_chars = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if segment.is_empty() || segment == "." || segment == ".." || !valid_chars {
            anyhow::bail!("Invalid model name '{}'", name);
        }
    }

    Ok(())
}

/// Directory name a hub repository is stored under.
pub fn repo_dir_name(repo: &str) -> String {
    repo.replace('/', "--")
}

struct CandleEmbedder(M3Encoder);

impl Embedder for CandleEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Value> {
        let encoded = self.0.encode(texts)?;
        Ok(serde_json::to_value(encoded)?)
    }
}

struct CandleReranker(CrossEncoder);

impl Reranker for CandleReranker {
    fn compute_score(&self, pairs: &[(String, String)]) -> Result<Value> {
        Ok(Value::from(self.0.compute_score(pairs)?))
    }
}
