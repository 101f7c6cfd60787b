//! qdrant-launcher: start a local Qdrant for development.
//!
//! Runs Qdrant in Docker with its storage on a host directory, then checks
//! that the HTTP API answers. When anything goes wrong it prints how to start
//! Qdrant by hand instead of failing.

mod docker;
mod probe;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docker::ContainerSpec;

#[derive(Parser, Debug)]
#[command(name = "qdrant-launcher")]
#[command(about = "Start a local Qdrant container and check the connection")]
struct Args {
    /// Container name (an existing container with this name is replaced)
    #[arg(long, default_value = "qdrant_test")]
    name: String,

    /// Host port for the Qdrant HTTP API
    #[arg(long, default_value_t = 6333)]
    port: u16,

    /// Host directory for Qdrant storage
    #[arg(long, default_value = "qdrant_data")]
    data_dir: PathBuf,

    /// Qdrant image to run
    #[arg(long, default_value = "qdrant/qdrant:latest")]
    image: String,

    /// Host the API is reachable on
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Seconds to wait after starting the container
    #[arg(long, default_value_t = 5)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "qdrant_launcher=info".into()),
        )
        .init();

    let args = Args::parse();

    let started = match start_container(&args).await {
        Ok(started) => started,
        Err(e) => {
            error!("Could not start Qdrant: {:#}", e);
            false
        }
    };
    if !started {
        warn!("Could not start Qdrant automatically");
    }

    info!("Testing connection to Qdrant...");
    match probe::count_collections(&args.host, args.port).await {
        Ok(count) => {
            info!("Connected to Qdrant at {}:{}", args.host, args.port);
            info!("Available collections: {}", count);
        }
        Err(e) => {
            error!("Qdrant is not available: {:#}", e);
            print_manual_instructions(&args);
        }
    }

    Ok(())
}

/// Start the container. Returns `false` when docker is unavailable.
async fn start_container(args: &Args) -> Result<bool> {
    let data_dir = prepare_data_dir(&args.data_dir).await?;
    info!("Data directory: {}", data_dir.display());

    let Some(version) = docker::docker_version().await else {
        warn!("Docker not available");
        return Ok(false);
    };
    info!("Found {}", version);

    docker::remove_existing(&args.name).await;

    let spec = ContainerSpec {
        name: args.name.clone(),
        image: args.image.clone(),
        port: args.port,
        data_dir,
    };
    let id = docker::start(&spec).await?;
    info!("Started container {} ({})", spec.name, short_id(&id));

    if args.wait_secs > 0 {
        info!("Waiting {}s for Qdrant to be ready...", args.wait_secs);
        tokio::time::sleep(Duration::from_secs(args.wait_secs)).await;
    }

    Ok(true)
}

/// Create the storage directory and return its absolute path.
async fn prepare_data_dir(dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    tokio::fs::canonicalize(dir)
        .await
        .with_context(|| format!("Failed to resolve {}", dir.display()))
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn print_manual_instructions(args: &Args) {
    let spec = ContainerSpec {
        name: args.name.clone(),
        image: args.image.clone(),
        port: args.port,
        data_dir: args.data_dir.clone(),
    };

    println!();
    println!("To use Qdrant, either:");
    println!("  1. Install Docker (https://www.docker.com/products/docker-desktop) and run:");
    println!("       {}", spec.command_line());
    println!("  2. Download a Qdrant binary from https://github.com/qdrant/qdrant/releases");
    println!("  3. Use Qdrant Cloud: https://cloud.qdrant.io/");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["qdrant-launcher"]);
        assert_eq!(args.name, "qdrant_test");
        assert_eq!(args.port, 6333);
        assert_eq!(args.data_dir, PathBuf::from("qdrant_data"));
        assert_eq!(args.image, "qdrant/qdrant:latest");
        assert_eq!(args.host, "localhost");
        assert_eq!(args.wait_secs, 5);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_prepare_data_dir_is_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = prepare_data_dir(&tmp.path().join("nested/data")).await.unwrap();

        assert!(dir.is_absolute());
        assert!(dir.is_dir());
        assert!(dir.ends_with("nested/data"));
    }
}
