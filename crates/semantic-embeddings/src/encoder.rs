use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::Linear;
use candle_transformers::models::xlm_roberta::{Config, XLMRobertaModel};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokenizers::{Tokenizer, TruncationParams};

use crate::batch::{self, FORWARD_BATCH_SIZE};
use crate::files::{self, ModelFiles};
use crate::sparse::lexical_weights;
use crate::{Embedding, Precision};

/// Tokens whose weights never appear in lexical output.
const SPECIAL_TOKENS: &[&str] = &["<s>", "</s>", "<pad>", "<unk>"];

/// Output of [`M3Encoder::encode`], one entry per input text.
///
/// Field names follow the BGE-M3 reference output so that consumers probing
/// by key see the same layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Encoded {
    pub dense_vecs: Vec<Embedding>,
    pub lexical_weights: Vec<HashMap<String, f32>>,
}

/// XLM-RoBERTa encoder producing dense and lexical (sparse) embeddings.
///
/// Dense vectors are the L2-normalized `[CLS]` hidden state. Lexical weights
/// come from the `sparse_linear` head when the model ships one; otherwise
/// every text gets an empty weight map.
pub struct M3Encoder {
    model: XLMRobertaModel,
    sparse_linear: Option<Linear>,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    special_ids: HashSet<u32>,
}

impl M3Encoder {
    /// Load the encoder from resolved model files.
    pub fn load(files: &ModelFiles, precision: Precision, max_length: usize) -> Result<Self> {
        // Use CPU for now (Metal/CUDA support can be added later)
        let device = Device::Cpu;
        let dtype = precision.dtype();

        let config: Config = files.read_config()?;
        let tokenizer = prepare_tokenizer(files.read_tokenizer()?, max_length)?;

        let vb = files::var_builder(&files.weights, dtype, &device)?;
        let model = XLMRobertaModel::new(&config, vb).context("Failed to build encoder")?;

        let sparse_linear = match &files.sparse_linear {
            Some(path) => {
                let vb = files::var_builder(path, dtype, &device)?;
                Some(candle_nn::linear(config.hidden_size, 1, vb).context("Failed to load sparse head")?)
            }
            None => None,
        };

        let pad_id = tokenizer.token_to_id("<pad>").unwrap_or(1);
        let special_ids = SPECIAL_TOKENS
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();

        Ok(Self {
            model,
            sparse_linear,
            tokenizer,
            device,
            pad_id,
            special_ids,
        })
    }

    /// Whether this encoder can produce lexical weights.
    pub fn has_sparse_head(&self) -> bool {
        self.sparse_linear.is_some()
    }

    /// Encode texts into dense vectors and lexical weights.
    pub fn encode(&self, texts: &[String]) -> Result<Encoded> {
        let mut out = Encoded::default();

        for chunk in texts.chunks(FORWARD_BATCH_SIZE) {
            let encoded = self.encode_chunk(chunk)?;
            out.dense_vecs.extend(encoded.dense_vecs);
            out.lexical_weights.extend(encoded.lexical_weights);
        }

        Ok(out)
    }

    fn encode_chunk(&self, texts: &[String]) -> Result<Encoded> {
        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(text.as_str(), true)
                    .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = batch::pad(&encodings, self.pad_id, &self.device)?;

        // hidden shape: [batch_size, seq_len, hidden_size]
        let hidden = self.model.forward(
            &batch.token_ids,
            &batch.attention_mask,
            &batch.token_type_ids,
            None,
            None,
            None,
        )?;

        #[cfg(feature = "debug")]
        log::debug!("Encoder output shape: {:?}", hidden.shape().dims());

        let cls = hidden.i((.., 0))?.to_dtype(DType::F32)?;
        let dense_vecs = normalize(&cls)?
            .to_vec2::<f32>()
            .context("Failed to convert dense tensor to vec")?;

        let lexical = match &self.sparse_linear {
            Some(linear) => {
                let token_weights = linear
                    .forward(&hidden)?
                    .relu()?
                    .squeeze(2)?
                    .to_dtype(DType::F32)?
                    .to_vec2::<f32>()?;

                batch
                    .ids
                    .iter()
                    .zip(&token_weights)
                    .map(|(ids, weights)| lexical_weights(ids, weights, &self.special_ids))
                    .collect()
            }
            None => vec![HashMap::new(); texts.len()],
        };

        Ok(Encoded {
            dense_vecs,
            lexical_weights: lexical,
        })
    }
}

/// Disable fixed padding and cap sequence length.
///
/// Hub tokenizer files sometimes carry a fixed padding strategy; batches are
/// padded by hand instead so that masks stay accurate.
pub(crate) fn prepare_tokenizer(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;
    Ok(tokenizer)
}

/// Normalize embeddings to unit length (L2 normalization)
fn normalize(embeddings: &Tensor) -> Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(embeddings.dims().len() - 1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;

    embeddings
        .broadcast_div(&norm)
        .context("Normalization failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let t = Tensor::new(&[[3.0f32, 4.0], [0.0, 2.0]], &Device::Cpu).unwrap();
        let rows = normalize(&t).unwrap().to_vec2::<f32>().unwrap();

        assert!((rows[0][0] - 0.6).abs() < 1e-6);
        assert!((rows[0][1] - 0.8).abs() < 1e-6);
        assert!((rows[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_finite() {
        let t = Tensor::new(&[[0.0f32, 0.0]], &Device::Cpu).unwrap();
        let rows = normalize(&t).unwrap().to_vec2::<f32>().unwrap();
        assert!(rows[0].iter().all(|x| x.is_finite()));
    }
}
