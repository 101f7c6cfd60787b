#![deny(clippy::all)]

mod batch;
mod cross_encoder;
mod encoder;
mod files;
mod sparse;

// Re-export for external use
pub use cross_encoder::CrossEncoder;
pub use encoder::{Encoded, M3Encoder};
pub use files::{
    ModelFiles, CONFIG_FILE, PYTORCH_FILE, SAFETENSORS_FILE, SPARSE_LINEAR_FILE, TOKENIZER_FILE,
};
pub use sparse::lexical_weights;

/// Default maximum number of tokens per input (BGE-M3 supports 8192).
pub const DEFAULT_MAX_LENGTH: usize = 8192;

/// Type alias for a dense embedding vector.
pub type Embedding = Vec<f32>;

// Auto-initialize logging for debug builds
#[cfg(feature = "debug")]
#[ctor::ctor]
fn init_native_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Floating point precision used for model weights and activations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    F32,
    /// Half precision. Halves memory use; slow on most CPUs.
    F16,
}

impl Precision {
    pub fn from_fp16(use_fp16: bool) -> Self {
        if use_fp16 { Self::F16 } else { Self::F32 }
    }

    pub(crate) fn dtype(self) -> candle_core::DType {
        match self {
            Self::F32 => candle_core::DType::F32,
            Self::F16 => candle_core::DType::F16,
        }
    }
}
