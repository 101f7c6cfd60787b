//! Extraction of vectors and scores from loosely-shaped model output.
//!
//! Each quantity is read through an ordered chain of [`Extractor`]s; the
//! first strategy that recognizes the output wins. When none do, callers get
//! `None` and fall back to empty results rather than failing the request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys dense vectors have been published under, in probing order.
pub const DENSE_KEYS: &[&str] = &["dense", "dense_vecs", "dense_embeddings"];

/// Keys sparse vectors have been published under, in probing order.
pub const SPARSE_KEYS: &[&str] = &["sparse", "sparse_vecs", "sparse_embeddings", "lexical_weights"];

/// Sparse vector as parallel index/value lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// One way of reading a `T` out of raw model output.
pub trait Extractor<T>: Send + Sync {
    fn try_extract(&self, raw: &Value) -> Option<T>;
}

/// Strategies tried in order until one matches.
pub struct Chain<T> {
    strategies: Vec<Box<dyn Extractor<T>>>,
}

impl<T> Chain<T> {
    pub fn new(strategies: Vec<Box<dyn Extractor<T>>>) -> Self {
        Self { strategies }
    }

    pub fn first_match(&self, raw: &Value) -> Option<T> {
        self.strategies.iter().find_map(|s| s.try_extract(raw))
    }
}

/// Dense rows stored under a key, as a list of rows or one flat row.
pub struct DenseAtKey(pub &'static str);

impl Extractor<Vec<Vec<f32>>> for DenseAtKey {
    fn try_extract(&self, raw: &Value) -> Option<Vec<Vec<f32>>> {
        let items = raw.get(self.0)?.as_array()?;

        // No rows, rather than one empty row
        if items.is_empty() {
            return Some(Vec::new());
        }

        if let Some(row) = float_list(items) {
            return Some(vec![row]);
        }

        items
            .iter()
            .map(|row| float_list(row.as_array()?))
            .collect()
    }
}

/// Per-text sparse entries stored under a key, left unparsed.
///
/// A list holds one entry per text; anything else is a single entry.
pub struct SparseAtKey(pub &'static str);

impl Extractor<Vec<Value>> for SparseAtKey {
    fn try_extract(&self, raw: &Value) -> Option<Vec<Value>> {
        match raw.get(self.0)? {
            Value::Null => None,
            Value::Array(items) => Some(items.clone()),
            other => Some(vec![other.clone()]),
        }
    }
}

/// `{"<token id>": weight, ...}`
pub struct TokenWeightMap;

impl Extractor<SparseVector> for TokenWeightMap {
    fn try_extract(&self, raw: &Value) -> Option<SparseVector> {
        let map = raw.as_object()?;

        let mut pairs = map
            .iter()
            .map(|(key, value)| Some((key.parse::<u32>().ok()?, as_float(value)?)))
            .collect::<Option<Vec<_>>>()?;
        pairs.sort_by_key(|(index, _)| *index);

        Some(pairs.into_iter().unzip_sparse())
    }
}

/// `{"indices": [...], "values": [...]}`
pub struct IndicesValues;

impl Extractor<SparseVector> for IndicesValues {
    fn try_extract(&self, raw: &Value) -> Option<SparseVector> {
        let indices = raw
            .get("indices")?
            .as_array()?
            .iter()
            .map(as_index)
            .collect::<Option<Vec<_>>>()?;
        let values = float_list(raw.get("values")?.as_array()?)?;

        if indices.len() != values.len() {
            return None;
        }
        Some(SparseVector { indices, values })
    }
}

/// `[[index, weight], ...]`
pub struct PairSequence;

impl Extractor<SparseVector> for PairSequence {
    fn try_extract(&self, raw: &Value) -> Option<SparseVector> {
        raw.as_array()?
            .iter()
            .map(|pair| match pair.as_array()?.as_slice() {
                [index, weight] => Some((as_index(index)?, as_float(weight)?)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|pairs| pairs.into_iter().unzip_sparse())
    }
}

/// `[score, ...]`
pub struct ScoreList;

impl Extractor<Vec<f32>> for ScoreList {
    fn try_extract(&self, raw: &Value) -> Option<Vec<f32>> {
        float_list(raw.as_array()?)
    }
}

/// A bare number, as returned for a single pair.
pub struct SingleScore;

impl Extractor<Vec<f32>> for SingleScore {
    fn try_extract(&self, raw: &Value) -> Option<Vec<f32>> {
        raw.as_f64().map(|score| vec![score as f32])
    }
}

/// `{"scores": [...]}`
pub struct ScoresAtKey(pub &'static str);

impl Extractor<Vec<f32>> for ScoresAtKey {
    fn try_extract(&self, raw: &Value) -> Option<Vec<f32>> {
        float_list(raw.get(self.0)?.as_array()?)
    }
}

/// The extraction chains the service uses.
pub struct OutputExtractor {
    dense: Chain<Vec<Vec<f32>>>,
    sparse: Chain<Vec<Value>>,
    sparse_entry: Chain<SparseVector>,
    scores: Chain<Vec<f32>>,
}

impl Default for OutputExtractor {
    fn default() -> Self {
        Self {
            dense: Chain::new(
                DENSE_KEYS
                    .iter()
                    .map(|k| Box::new(DenseAtKey(*k)) as Box<dyn Extractor<Vec<Vec<f32>>>>)
                    .collect(),
            ),
            sparse: Chain::new(
                SPARSE_KEYS
                    .iter()
                    .map(|k| Box::new(SparseAtKey(*k)) as Box<dyn Extractor<Vec<Value>>>)
                    .collect(),
            ),
            sparse_entry: Chain::new(vec![
                Box::new(TokenWeightMap),
                Box::new(IndicesValues),
                Box::new(PairSequence),
            ]),
            scores: Chain::new(vec![
                Box::new(ScoreList),
                Box::new(SingleScore),
                Box::new(ScoresAtKey("scores")),
            ]),
        }
    }
}

impl OutputExtractor {
    /// Dense rows, one per input text.
    pub fn dense(&self, raw: &Value) -> Option<Vec<Vec<f32>>> {
        self.dense.first_match(raw)
    }

    /// Sparse vectors, one per input text. Entries in an unknown shape
    /// become empty vectors.
    pub fn sparse(&self, raw: &Value) -> Option<Vec<SparseVector>> {
        let entries = self.sparse.first_match(raw)?;
        Some(
            entries
                .iter()
                .map(|entry| {
                    self.sparse_entry.first_match(entry).unwrap_or_else(|| {
                        tracing::warn!("Unrecognized sparse entry shape, using empty vector");
                        SparseVector::default()
                    })
                })
                .collect(),
        )
    }

    /// Relevance scores, one per pair.
    pub fn scores(&self, raw: &Value) -> Option<Vec<f32>> {
        self.scores.first_match(raw)
    }
}

fn as_float(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|i| u32::try_from(i).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// All items as floats, or `None` if any is not numeric.
fn float_list(items: &[Value]) -> Option<Vec<f32>> {
    items.iter().map(as_float).collect()
}

trait UnzipSparse {
    fn unzip_sparse(self) -> SparseVector;
}

impl<I: Iterator<Item = (u32, f32)>> UnzipSparse for I {
    fn unzip_sparse(self) -> SparseVector {
        let (indices, values) = self.unzip();
        SparseVector { indices, values }
    }
}
