//! Model kinds and the inference interface the service consumes.
//!
//! Inference results are loosely-shaped JSON. Different backends (and
//! different versions of the same backend) name and nest their outputs
//! differently; [`crate::extract`] turns them into concrete vectors.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Embed,
    Rerank,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embed => "embed",
            Self::Rerank => "rerank",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense + sparse text encoder.
///
/// Calls are blocking; run them off the async executor.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[String]) -> anyhow::Result<Value>;

    /// Encode short query texts. Backends without a query mode encode normally.
    fn encode_queries(&self, texts: &[String]) -> anyhow::Result<Value> {
        self.encode(texts)
    }
}

/// Relevance scorer for (query, document) pairs.
pub trait Reranker: Send + Sync {
    fn compute_score(&self, pairs: &[(String, String)]) -> anyhow::Result<Value>;
}

/// A freshly constructed model of either kind.
#[derive(Clone)]
pub enum LoadedModel {
    Embedder(Arc<dyn Embedder>),
    Reranker(Arc<dyn Reranker>),
}

impl LoadedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Embedder(_) => ModelKind::Embed,
            Self::Reranker(_) => ModelKind::Rerank,
        }
    }

    pub fn into_embedder(self) -> Option<Arc<dyn Embedder>> {
        match self {
            Self::Embedder(model) => Some(model),
            Self::Reranker(_) => None,
        }
    }

    pub fn into_reranker(self) -> Option<Arc<dyn Reranker>> {
        match self {
            Self::Reranker(model) => Some(model),
            Self::Embedder(_) => None,
        }
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadedModel").field(&self.kind()).finish()
    }
}
