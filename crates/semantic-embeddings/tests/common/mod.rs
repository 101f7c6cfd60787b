use once_cell::sync::Lazy;
use semantic_embeddings::{CrossEncoder, M3Encoder, ModelFiles, Precision, DEFAULT_MAX_LENGTH};
use std::path::PathBuf;

fn model_dir(var: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| panic!("Set {} to a local model directory", var))
}

// Shared model instances loaded once for all tests
pub static TEST_ENCODER: Lazy<M3Encoder> = Lazy::new(|| {
    let files = ModelFiles::from_dir(&model_dir("M3_MODEL_DIR")).expect("Failed to resolve encoder files");
    M3Encoder::load(&files, Precision::F32, DEFAULT_MAX_LENGTH).expect("Failed to load encoder")
});

pub static TEST_RERANKER: Lazy<CrossEncoder> = Lazy::new(|| {
    let files =
        ModelFiles::from_dir(&model_dir("RERANKER_MODEL_DIR")).expect("Failed to resolve reranker files");
    CrossEncoder::load(&files, Precision::F32, DEFAULT_MAX_LENGTH).expect("Failed to load reranker")
});
