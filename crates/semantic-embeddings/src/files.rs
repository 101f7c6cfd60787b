//! Locating and reading model files on disk.

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const SAFETENSORS_FILE: &str = "model.safetensors";
pub const PYTORCH_FILE: &str = "pytorch_model.bin";
pub const SPARSE_LINEAR_FILE: &str = "sparse_linear.pt";

/// Paths to the files making up one pretrained model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// `model.safetensors`, or `pytorch_model.bin` when no safetensors file exists
    pub weights: PathBuf,
    /// BGE-M3 lexical weight head, only present for M3-style encoders
    pub sparse_linear: Option<PathBuf>,
}

impl ModelFiles {
    /// Resolve model files inside a directory.
    ///
    /// # Expected files
    /// - `config.json` - Model configuration
    /// - `tokenizer.json` - Tokenizer configuration
    /// - `model.safetensors` or `pytorch_model.bin` - Model weights
    /// - `sparse_linear.pt` - Optional sparse head
    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let config = require(model_dir, CONFIG_FILE)?;
        let tokenizer = require(model_dir, TOKENIZER_FILE)?;

        let safetensors = model_dir.join(SAFETENSORS_FILE);
        let weights = if safetensors.is_file() {
            safetensors
        } else {
            require(model_dir, PYTORCH_FILE).with_context(|| {
                format!("No {} or {} in {}", SAFETENSORS_FILE, PYTORCH_FILE, model_dir.display())
            })?
        };

        let sparse_linear = Some(model_dir.join(SPARSE_LINEAR_FILE)).filter(|p| p.is_file());

        Ok(Self {
            config,
            tokenizer,
            weights,
            sparse_linear,
        })
    }

    pub(crate) fn read_config<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let json = std::fs::read_to_string(&self.config)
            .with_context(|| format!("Failed to read {}", self.config.display()))?;
        serde_json::from_str(&json).context("Failed to parse config.json")
    }

    pub(crate) fn read_tokenizer(&self) -> Result<tokenizers::Tokenizer> {
        tokenizers::Tokenizer::from_file(&self.tokenizer)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))
    }
}

fn require(model_dir: &Path, name: &str) -> Result<PathBuf> {
    let path = model_dir.join(name);
    if !path.is_file() {
        anyhow::bail!("Missing model file: {}", path.display());
    }
    Ok(path)
}

/// Build a VarBuilder from a weights file, picking the loader by extension.
pub(crate) fn var_builder(path: &Path, dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("safetensors") => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(VarBuilder::from_buffered_safetensors(bytes, dtype, device)?)
        }
        _ => VarBuilder::from_pth(path, dtype, device)
            .with_context(|| format!("Failed to load {}", path.display())),
    }
}
