//! Lazily loaded, swappable model instances.
//!
//! The cache holds one slot per [`ModelKind`]. Each slot owns at most one
//! loaded model together with the name it was loaded under. Requests for the
//! bound name are served from the slot without waiting on anything but the
//! slot's own read lock, which is only ever held for writing while a finished
//! model is being bound.
//!
//! All loads, of either kind, go through a single exclusive section. Loads
//! are therefore never concurrent, and two callers asking for the same
//! unbound name produce exactly one construction: the second re-checks the
//! slot after acquiring the section and finds the first caller's model.
//! Callers asking for *different* names are not coalesced; each mismatch
//! triggers another load.
//!
//! A load runs in its own task and holds the exclusive section until the
//! model is bound. A caller that stops waiting does not cancel it.
//!
//! Load options (e.g. the download directory) are passed to the loader for
//! the load they trigger and nowhere else. A request for a name that is
//! already bound ignores its options.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::loader::ModelLoader;
use crate::models::{Embedder, LoadedModel, ModelKind, Reranker};

/// Options applied when constructing a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Directory model files are downloaded to
    pub cache_dir: PathBuf,
    /// Load weights in half precision
    pub use_fp16: bool,
}

/// Model names used when a request does not specify one.
#[derive(Debug, Clone)]
pub struct DefaultModels {
    pub embed: String,
    pub rerank: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to load {kind} model '{name}'")]
    Load {
        kind: ModelKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A model bound to the name it was loaded under.
struct Binding<T: ?Sized> {
    name: String,
    instance: Arc<T>,
}

/// Holds the currently bound model of one kind.
pub struct ModelSlot<T: ?Sized> {
    kind: ModelKind,
    binding: RwLock<Option<Binding<T>>>,
}

impl<T: ?Sized> ModelSlot<T> {
    fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            binding: RwLock::new(None),
        }
    }

    /// The bound instance, if it was loaded under `name`.
    async fn get_if(&self, name: &str) -> Option<Arc<T>> {
        let binding = self.binding.read().await;
        binding
            .as_ref()
            .filter(|b| b.name == name)
            .map(|b| Arc::clone(&b.instance))
    }

    /// Replace the binding. The slot's reference to the previous model is
    /// dropped; callers still holding it keep it alive until they finish.
    async fn bind(&self, name: String, instance: Arc<T>) -> Option<String> {
        let mut binding = self.binding.write().await;
        binding
            .replace(Binding { name, instance })
            .map(|previous| previous.name)
    }

    pub async fn loaded_name(&self) -> Option<String> {
        self.binding.read().await.as_ref().map(|b| b.name.clone())
    }
}

/// State shared with in-flight load tasks.
struct Shared {
    loader: Arc<dyn ModelLoader>,
    default_options: LoadOptions,
    embedder: ModelSlot<dyn Embedder>,
    reranker: ModelSlot<dyn Reranker>,
    /// Serializes every load across both kinds
    load_lock: Mutex<()>,
}

fn embedder_slot(shared: &Shared) -> &ModelSlot<dyn Embedder> {
    &shared.embedder
}

fn reranker_slot(shared: &Shared) -> &ModelSlot<dyn Reranker> {
    &shared.reranker
}

/// Process-wide cache of the embedding and reranking models.
pub struct ModelCache {
    shared: Arc<Shared>,
    defaults: DefaultModels,
}

impl ModelCache {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        defaults: DefaultModels,
        default_options: LoadOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                loader,
                default_options,
                embedder: ModelSlot::new(ModelKind::Embed),
                reranker: ModelSlot::new(ModelKind::Rerank),
                load_lock: Mutex::new(()),
            }),
            defaults,
        }
    }

    /// Default options with the download directory optionally overridden.
    pub fn options_for(&self, cache_dir: Option<&Path>) -> LoadOptions {
        let defaults = &self.shared.default_options;
        match cache_dir {
            Some(dir) => LoadOptions {
                cache_dir: dir.to_path_buf(),
                ..defaults.clone()
            },
            None => defaults.clone(),
        }
    }

    /// Name a request resolves to. Absent and empty names mean the default.
    pub fn resolve_name<'a>(&'a self, kind: ModelKind, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(name) if !name.is_empty() => name,
            _ => match kind {
                ModelKind::Embed => &self.defaults.embed,
                ModelKind::Rerank => &self.defaults.rerank,
            },
        }
    }

    /// Name of the model currently bound for `kind`.
    pub async fn loaded_name(&self, kind: ModelKind) -> Option<String> {
        match kind {
            ModelKind::Embed => self.shared.embedder.loaded_name().await,
            ModelKind::Rerank => self.shared.reranker.loaded_name().await,
        }
    }

    /// Return the model of `kind` named `requested`, loading it if needed.
    pub async fn ensure(
        &self,
        kind: ModelKind,
        requested: Option<&str>,
        options: Option<LoadOptions>,
    ) -> Result<LoadedModel, CacheError> {
        match kind {
            ModelKind::Embed => self
                .ensure_embedder(requested, options)
                .await
                .map(LoadedModel::Embedder),
            ModelKind::Rerank => self
                .ensure_reranker(requested, options)
                .await
                .map(LoadedModel::Reranker),
        }
    }

    pub async fn ensure_embedder(
        &self,
        requested: Option<&str>,
        options: Option<LoadOptions>,
    ) -> Result<Arc<dyn Embedder>, CacheError> {
        let name = self.resolve_name(ModelKind::Embed, requested);
        self.ensure_in(embedder_slot, name, options, LoadedModel::into_embedder)
            .await
    }

    pub async fn ensure_reranker(
        &self,
        requested: Option<&str>,
        options: Option<LoadOptions>,
    ) -> Result<Arc<dyn Reranker>, CacheError> {
        let name = self.resolve_name(ModelKind::Rerank, requested);
        self.ensure_in(reranker_slot, name, options, LoadedModel::into_reranker)
            .await
    }

    async fn ensure_in<T>(
        &self,
        slot: fn(&Shared) -> &ModelSlot<T>,
        name: &str,
        options: Option<LoadOptions>,
        unwrap: fn(LoadedModel) -> Option<Arc<T>>,
    ) -> Result<Arc<T>, CacheError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let kind = slot(&self.shared).kind;
        if let Some(instance) = slot(&self.shared).get_if(name).await {
            return Ok(instance);
        }

        // Dropping the handle detaches the task; the load still finishes and binds
        let shared = Arc::clone(&self.shared);
        let owned_name = name.to_string();
        let load = tokio::spawn(async move {
            shared.load_into(slot, &owned_name, options, unwrap).await
        });

        match load.await {
            Ok(result) => result,
            Err(e) => Err(CacheError::Load {
                kind,
                name: name.to_string(),
                source: anyhow::anyhow!("Load task failed: {}", e),
            }),
        }
    }
}

impl Shared {
    async fn load_into<T: ?Sized>(
        &self,
        slot: fn(&Shared) -> &ModelSlot<T>,
        name: &str,
        options: Option<LoadOptions>,
        unwrap: fn(LoadedModel) -> Option<Arc<T>>,
    ) -> Result<Arc<T>, CacheError> {
        let slot = slot(self);
        let _load_guard = self.load_lock.lock().await;

        // Another caller may have loaded this name while we waited
        if let Some(instance) = slot.get_if(name).await {
            return Ok(instance);
        }

        let kind = slot.kind;
        let options = options.unwrap_or_else(|| self.default_options.clone());
        tracing::info!("Loading {} model '{}'", kind, name);
        let started = Instant::now();

        let loaded = self.loader.load(kind, name, &options).await.and_then(|model| {
            let actual = model.kind();
            unwrap(model).ok_or_else(|| anyhow::anyhow!("Loader returned a {} model", actual))
        });

        match loaded {
            Ok(instance) => {
                let previous = slot.bind(name.to_string(), Arc::clone(&instance)).await;
                match previous {
                    Some(previous) => tracing::info!(
                        "Loaded {} model '{}' in {:.1?}, replacing '{}'",
                        kind,
                        name,
                        started.elapsed(),
                        previous
                    ),
                    None => tracing::info!(
                        "Loaded {} model '{}' in {:.1?}",
                        kind,
                        name,
                        started.elapsed()
                    ),
                }
                Ok(instance)
            }
            Err(source) => {
                tracing::error!("Failed to load {} model '{}': {:#}", kind, name, source);
                Err(CacheError::Load {
                    kind,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}
