//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the embedding service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Model used when an embed request does not name one
    #[serde(default = "default_embed_model")]
    pub default_embed_model: String,

    /// Model used when a rerank request does not name one
    #[serde(default = "default_rerank_model")]
    pub default_rerank_model: String,

    /// Directory downloaded models are stored under
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Load weights in half precision
    #[serde(default)]
    pub use_fp16: bool,

    /// Base URL of the model hub
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Largest accepted `texts` list for `/embed_batch`
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Inputs are truncated to this many tokens
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
}

fn default_embed_model() -> String {
    "BAAI/bge-m3".to_string()
}

fn default_rerank_model() -> String {
    "BAAI/bge-reranker-v2-m3".to_string()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("embedding-service/models")
}

fn default_hub_url() -> String {
    "https://huggingface.co".to_string()
}

fn default_max_batch_size() -> usize {
    256
}

fn default_max_sequence_length() -> usize {
    semantic_embeddings::DEFAULT_MAX_LENGTH
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_embed_model: default_embed_model(),
            default_rerank_model: default_rerank_model(),
            cache_dir: default_cache_dir(),
            use_fp16: false,
            hub_url: default_hub_url(),
            max_batch_size: default_max_batch_size(),
            max_sequence_length: default_max_sequence_length(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file, or use defaults when no path is given.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let Some(config_file) = config_file else {
            tracing::info!("No config file given, using defaults");
            return Ok(Self::default());
        };

        if !config_file.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
        let config: ServiceConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_file))?;
        tracing::info!("Loaded configuration from {:?}", config_file);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{ "default_embed_model": "org/custom" }"#).unwrap();

        assert_eq!(config.default_embed_model, "org/custom");
        assert_eq!(config.default_rerank_model, "BAAI/bge-reranker-v2-m3");
        assert_eq!(config.max_batch_size, 256);
        assert!(!config.use_fp16);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig::load(Some(&dir.path().join("missing.json"))).unwrap();
        assert_eq!(config.default_embed_model, "BAAI/bge-m3");

        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.hub_url, "https://huggingface.co");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "cache_dir": "/models", "use_fp16": true }"#).unwrap();

        let config = ServiceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/models"));
        assert!(config.use_fp16);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(ServiceConfig::load(Some(&path)).is_err());
    }
}
