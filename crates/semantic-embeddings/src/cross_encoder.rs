use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::{Config, XLMRobertaForSequenceClassification};
use tokenizers::Tokenizer;

use crate::batch::{self, FORWARD_BATCH_SIZE};
use crate::encoder::prepare_tokenizer;
use crate::files::{self, ModelFiles};
use crate::Precision;

/// Cross-encoder scoring (query, document) pairs with a single-logit head.
///
/// Scores are raw logits; higher means more relevant.
pub struct CrossEncoder {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
}

impl CrossEncoder {
    pub fn load(files: &ModelFiles, precision: Precision, max_length: usize) -> Result<Self> {
        let device = Device::Cpu;

        let config: Config = files.read_config()?;
        let tokenizer = prepare_tokenizer(files.read_tokenizer()?, max_length)?;

        let vb = files::var_builder(&files.weights, precision.dtype(), &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)
            .context("Failed to build cross-encoder")?;

        let pad_id = tokenizer.token_to_id("<pad>").unwrap_or(1);

        Ok(Self {
            model,
            tokenizer,
            device,
            pad_id,
        })
    }

    /// Score each (query, document) pair. Output order matches input order.
    pub fn compute_score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());

        for chunk in pairs.chunks(FORWARD_BATCH_SIZE) {
            let encodings = chunk
                .iter()
                .map(|(query, document)| {
                    self.tokenizer
                        .encode((query.as_str(), document.as_str()), true)
                        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
                })
                .collect::<Result<Vec<_>>>()?;

            let batch = batch::pad(&encodings, self.pad_id, &self.device)?;

            // logits shape: [batch_size, 1]
            let logits = self
                .model
                .forward(&batch.token_ids, &batch.attention_mask, &batch.token_type_ids)?
                .to_dtype(DType::F32)?
                .squeeze(1)?
                .to_vec1::<f32>()
                .context("Failed to convert scores to vec")?;

            scores.extend(logits);
        }

        Ok(scores)
    }
}
