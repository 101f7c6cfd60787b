#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embedding_service::cache::{DefaultModels, LoadOptions, ModelCache};
use embedding_service::loader::ModelLoader;
use embedding_service::{Embedder, LoadedModel, ModelKind, Reranker};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

pub const DEFAULT_EMBED: &str = "test/default-embed";
pub const DEFAULT_RERANK: &str = "test/default-rerank";

/// Embeds every text as `[text length, 1.0]` with one lexical weight.
pub struct FakeEmbedder;

impl Embedder for FakeEmbedder {
    fn encode(&self, texts: &[String]) -> anyhow::Result<Value> {
        let dense: Vec<Value> = texts.iter().map(|t| json!([t.len() as f32, 1.0])).collect();
        let sparse: Vec<Value> = texts.iter().map(|_| json!({ "7": 0.5 })).collect();
        Ok(json!({ "dense_vecs": dense, "lexical_weights": sparse }))
    }
}

/// How many scores a [`FakeReranker`] returns relative to its documents.
#[derive(Debug, Clone, Copy)]
pub enum ScoreCount {
    Exact,
    OneShort,
    OneExtra,
}

/// Scores each document by parsing it as a number.
pub struct FakeReranker(pub ScoreCount);

impl Reranker for FakeReranker {
    fn compute_score(&self, pairs: &[(String, String)]) -> anyhow::Result<Value> {
        let mut scores: Vec<f32> = pairs
            .iter()
            .map(|(_, doc)| doc.parse().unwrap_or(0.0))
            .collect();
        match self.0 {
            ScoreCount::Exact => {}
            ScoreCount::OneShort => {
                scores.pop();
            }
            ScoreCount::OneExtra => scores.push(99.0),
        }
        Ok(json!(scores))
    }
}

/// Loader that counts constructions.
///
/// Names listed as failing return an error. Names starting with `slow` wait
/// for a permit from the gate before finishing. Rerankers whose names contain
/// `one-short` or `one-extra` return a mismatched number of scores.
pub struct FakeLoader {
    loads: AtomicUsize,
    delay: Duration,
    failing: HashSet<String>,
    gate: Arc<Semaphore>,
    seen: Mutex<Vec<(ModelKind, String, LoadOptions)>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failing: HashSet::new(),
            gate: Arc::new(Semaphore::new(0)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn release_slow_load(&self) {
        self.gate.add_permits(1);
    }

    pub fn seen(&self) -> Vec<(ModelKind, String, LoadOptions)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self, kind: ModelKind, name: &str, options: &LoadOptions) -> anyhow::Result<LoadedModel> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((kind, name.to_string(), options.clone()));

        if name.starts_with("slow") {
            let _permit = self.gate.acquire().await?;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(name) {
            anyhow::bail!("weights not found for {}", name);
        }

        Ok(match kind {
            ModelKind::Embed => LoadedModel::Embedder(Arc::new(FakeEmbedder)),
            ModelKind::Rerank => LoadedModel::Reranker(Arc::new(FakeReranker(score_count(name)))),
        })
    }
}

fn score_count(name: &str) -> ScoreCount {
    if name.contains("one-short") {
        ScoreCount::OneShort
    } else if name.contains("one-extra") {
        ScoreCount::OneExtra
    } else {
        ScoreCount::Exact
    }
}

/// Loader that builds models on the blocking pool, like the hub loader, and
/// records how many constructions overlap.
pub struct BlockingLoader {
    build_time: Duration,
    constructions: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl BlockingLoader {
    pub fn new(build_time: Duration) -> Self {
        Self {
            build_time,
            constructions: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for BlockingLoader {
    async fn load(&self, kind: ModelKind, _name: &str, _options: &LoadOptions) -> anyhow::Result<LoadedModel> {
        let build_time = self.build_time;
        let constructions = Arc::clone(&self.constructions);
        let active = Arc::clone(&self.active);
        let max_active = Arc::clone(&self.max_active);

        tokio::task::spawn_blocking(move || {
            constructions.fetch_add(1, Ordering::SeqCst);
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(build_time);
            active.fetch_sub(1, Ordering::SeqCst);

            match kind {
                ModelKind::Embed => LoadedModel::Embedder(Arc::new(FakeEmbedder)),
                ModelKind::Rerank => LoadedModel::Reranker(Arc::new(FakeReranker(ScoreCount::Exact))),
            }
        })
        .await
        .map_err(Into::into)
    }
}

pub fn default_options() -> LoadOptions {
    LoadOptions {
        cache_dir: PathBuf::from("/tmp/default-models"),
        use_fp16: false,
    }
}

pub fn cache_with(loader: Arc<dyn ModelLoader>) -> ModelCache {
    ModelCache::new(
        loader,
        DefaultModels {
            embed: DEFAULT_EMBED.to_string(),
            rerank: DEFAULT_RERANK.to_string(),
        },
        default_options(),
    )
}
