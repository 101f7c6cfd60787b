//! Model downloading from Hugging Face.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::StatusCode;
use semantic_embeddings::{
    CONFIG_FILE, PYTORCH_FILE, SAFETENSORS_FILE, SPARSE_LINEAR_FILE, TOKENIZER_FILE,
};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Files smaller than this are treated as truncated downloads.
const MIN_FILE_SIZE: u64 = 100;

/// A file (or set of alternative files) a model needs.
#[derive(Debug, Clone, Copy)]
pub enum FileSpec {
    Required(&'static str),
    /// The first of these the hub publishes
    FirstOf(&'static [&'static str]),
    /// Downloaded when published, skipped otherwise
    Optional(&'static str),
}

const WEIGHTS: FileSpec = FileSpec::FirstOf(&[SAFETENSORS_FILE, PYTORCH_FILE]);

pub const EMBEDDER_FILES: &[FileSpec] = &[
    FileSpec::Required(CONFIG_FILE),
    FileSpec::Required(TOKENIZER_FILE),
    WEIGHTS,
    FileSpec::Optional(SPARSE_LINEAR_FILE),
];

pub const RERANKER_FILES: &[FileSpec] = &[
    FileSpec::Required(CONFIG_FILE),
    FileSpec::Required(TOKENIZER_FILE),
    WEIGHTS,
];

impl FileSpec {
    async fn is_satisfied(&self, model_dir: &Path) -> bool {
        match self {
            Self::Required(name) | Self::Optional(name) => is_present(&model_dir.join(name)).await,
            Self::FirstOf(names) => {
                for name in *names {
                    if is_present(&model_dir.join(name)).await {
                        return true;
                    }
                }
                false
            }
        }
    }
}

/// Download a hub repository's model files into `model_dir`.
///
/// Files already present are kept. Returns the path to the model directory.
pub async fn download_model(
    hub_url: &str,
    repo: &str,
    model_dir: &Path,
    specs: &[FileSpec],
) -> Result<PathBuf> {
    // Create model directory if needed
    if !model_dir.exists() {
        fs::create_dir_all(model_dir)
            .await
            .with_context(|| format!("Failed to create {}", model_dir.display()))?;
        tracing::info!("Created model directory: {}", model_dir.display());
    }

    if check_model_files(model_dir, specs).await {
        tracing::info!("Model {} already downloaded", repo);
        return Ok(model_dir.to_path_buf());
    }

    tracing::info!("Downloading {} from {}...", repo, hub_url);

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    for spec in specs {
        if spec.is_satisfied(model_dir).await {
            tracing::debug!("{:?} already exists, skipping", spec);
            continue;
        }

        match spec {
            FileSpec::Required(name) => {
                if !fetch(&client, hub_url, repo, name, model_dir).await? {
                    anyhow::bail!("{} is not published for {}", name, repo);
                }
            }
            FileSpec::FirstOf(names) => {
                let mut found = false;
                for name in *names {
                    if fetch(&client, hub_url, repo, name, model_dir).await? {
                        found = true;
                        break;
                    }
                }
                if !found {
                    anyhow::bail!("None of {:?} is published for {}", names, repo);
                }
            }
            FileSpec::Optional(name) => {
                if !fetch(&client, hub_url, repo, name, model_dir).await? {
                    tracing::debug!("{} not published for {}, skipping", name, repo);
                }
            }
        }
    }

    tracing::info!("Model download complete!");
    Ok(model_dir.to_path_buf())
}

/// Check if all non-optional model files exist and are valid.
async fn check_model_files(model_dir: &Path, specs: &[FileSpec]) -> bool {
    for spec in specs {
        if matches!(spec, FileSpec::Optional(_)) {
            continue;
        }
        if !spec.is_satisfied(model_dir).await {
            return false;
        }
    }
    true
}

async fn is_present(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.len() > MIN_FILE_SIZE)
}

/// URL of one file in a hub repository.
pub fn file_url(hub_url: &str, repo: &str, file: &str) -> String {
    format!("{}/{}/resolve/main/{}", hub_url.trim_end_matches('/'), repo, file)
}

/// Download one file. Returns `false` if the hub does not have it.
async fn fetch(
    client: &reqwest::Client,
    hub_url: &str,
    repo: &str,
    file: &str,
    model_dir: &Path,
) -> Result<bool> {
    let url = file_url(hub_url, repo, file);
    tracing::info!("Downloading {}...", file);

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to request {}", url))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(false);
    }

    let response = response
        .error_for_status()
        .with_context(|| format!("HTTP error downloading {}", url))?;

    let dest = model_dir.join(file);
    let partial = model_dir.join(format!("{}.part", file));

    let total_size = response.content_length();
    let mut stream = response.bytes_stream();

    let mut out = File::create(&partial).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed while downloading {}", file))?;
        out.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        // Log progress for large files
        if let Some(total) = total_size {
            if total > 1_000_000 && downloaded % 100_000_000 < chunk.len() as u64 {
                let percent = (downloaded as f64 / total as f64) * 100.0;
                tracing::info!("  {}: {:.1}%", file, percent);
            }
        }
    }

    out.flush().await?;
    drop(out);

    // Only complete files take the final name
    fs::rename(&partial, &dest).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FakeHub {
        files: HashMap<String, Vec<u8>>,
        requests: AtomicUsize,
    }

    async fn serve_file(
        State(hub): State<Arc<FakeHub>>,
        UrlPath(path): UrlPath<String>,
    ) -> Result<Vec<u8>, HttpStatus> {
        hub.requests.fetch_add(1, Ordering::SeqCst);
        hub.files.get(&path).cloned().ok_or(HttpStatus::NOT_FOUND)
    }

    /// Serve `files` under `org/model/resolve/main/` on a local port.
    async fn start_hub(files: &[&str]) -> (String, Arc<FakeHub>) {
        let hub = Arc::new(FakeHub {
            files: files
                .iter()
                .map(|f| (format!("org/model/resolve/main/{}", f), vec![b'x'; 256]))
                .collect(),
            requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/{*path}", get(serve_file))
            .with_state(Arc::clone(&hub));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), hub)
    }

    #[test]
    fn test_file_url() {
        assert_eq!(
            file_url("https://huggingface.co/", "BAAI/bge-m3", "config.json"),
            "https://huggingface.co/BAAI/bge-m3/resolve/main/config.json"
        );
    }

    #[tokio::test]
    async fn test_check_model_files_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!check_model_files(temp_dir.path(), EMBEDDER_FILES).await);
    }

    #[tokio::test]
    async fn test_truncated_file_is_not_present() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, b"{}").await.unwrap();
        assert!(!is_present(&path).await);
    }

    #[tokio::test]
    async fn test_downloads_fallback_weights_and_skips_missing_optional() {
        let (hub_url, hub) = start_hub(&[CONFIG_FILE, TOKENIZER_FILE, PYTORCH_FILE]).await;
        let temp_dir = TempDir::new().unwrap();
        let model_dir = temp_dir.path().join("org--model");

        download_model(&hub_url, "org/model", &model_dir, EMBEDDER_FILES)
            .await
            .unwrap();

        assert!(is_present(&model_dir.join(CONFIG_FILE)).await);
        assert!(is_present(&model_dir.join(TOKENIZER_FILE)).await);
        assert!(is_present(&model_dir.join(PYTORCH_FILE)).await);
        assert!(!model_dir.join(SAFETENSORS_FILE).exists());
        assert!(!model_dir.join(SPARSE_LINEAR_FILE).exists());
        assert!(!model_dir.join(format!("{}.part", CONFIG_FILE)).exists());

        // Second call finds everything on disk
        let before = hub.requests.load(Ordering::SeqCst);
        download_model(&hub_url, "org/model", &model_dir, EMBEDDER_FILES)
            .await
            .unwrap();
        assert_eq!(hub.requests.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_missing_required_file_fails() {
        let (hub_url, _hub) = start_hub(&[CONFIG_FILE, SAFETENSORS_FILE]).await;
        let temp_dir = TempDir::new().unwrap();

        let err = download_model(&hub_url, "org/model", temp_dir.path(), RERANKER_FILES)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }
}
