use anyhow::Result;
use candle_core::{Device, Tensor};
use tokenizers::Encoding;

/// Number of sequences sent through the network per forward pass.
pub(crate) const FORWARD_BATCH_SIZE: usize = 16;

/// Token tensors for one padded batch.
pub(crate) struct PaddedBatch {
    pub token_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
    /// Unpadded token ids per sequence
    pub ids: Vec<Vec<u32>>,
}

/// Pad all encodings to the longest one and build batch tensors.
pub(crate) fn pad(encodings: &[Encoding], pad_id: u32, device: &Device) -> Result<PaddedBatch> {
    let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
    let batch_size = encodings.len();

    let mut all_token_ids = Vec::with_capacity(batch_size * max_len);
    let mut all_masks = Vec::with_capacity(batch_size * max_len);
    let mut ids = Vec::with_capacity(batch_size);

    for encoding in encodings {
        let tokens = encoding.get_ids();
        all_token_ids.extend_from_slice(tokens);
        all_masks.extend(std::iter::repeat_n(1u32, tokens.len()));

        // Pad to max_len
        let padding = max_len - tokens.len();
        all_token_ids.extend(std::iter::repeat_n(pad_id, padding));
        all_masks.extend(std::iter::repeat_n(0u32, padding));

        ids.push(tokens.to_vec());
    }

    let token_ids = Tensor::from_vec(all_token_ids, (batch_size, max_len), device)?;
    let attention_mask = Tensor::from_vec(all_masks, (batch_size, max_len), device)?;
    let token_type_ids = token_ids.zeros_like()?;

    Ok(PaddedBatch {
        token_ids,
        attention_mask,
        token_type_ids,
        ids,
    })
}
