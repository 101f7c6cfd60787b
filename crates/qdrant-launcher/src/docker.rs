//! Thin wrapper over the `docker` command line.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Port Qdrant listens on inside the container
pub const CONTAINER_PORT: u16 = 6333;

/// Storage path inside the container
pub const CONTAINER_STORAGE: &str = "/qdrant/storage";

/// A Qdrant container to (re)create.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Host port mapped to the container's HTTP port
    pub port: u16,
    /// Absolute host directory mounted as storage
    pub data_dir: PathBuf,
}

impl ContainerSpec {
    /// Arguments for `docker run`.
    pub fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "-p".to_string(),
            format!("{}:{}", self.port, CONTAINER_PORT),
            "-v".to_string(),
            format!("{}:{}", self.data_dir.display(), CONTAINER_STORAGE),
            self.image.clone(),
        ]
    }

    /// The equivalent shell command, for printing.
    pub fn command_line(&self) -> String {
        format!("docker {}", self.run_args().join(" "))
    }
}

/// Docker version string, or `None` when docker is missing or not working.
pub async fn docker_version() -> Option<String> {
    let output = match Command::new("docker").arg("--version").output().await {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::debug!("docker --version exited with {}", output.status);
            return None;
        }
        Err(e) => {
            tracing::debug!("Could not run docker: {}", e);
            return None;
        }
    };

    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Stop and remove a container with this name. Failures (usually "no such
/// container") are ignored.
pub async fn remove_existing(name: &str) {
    for action in ["stop", "rm"] {
        let result = Command::new("docker").args([action, name]).output().await;
        if matches!(result, Ok(ref output) if output.status.success()) {
            tracing::debug!("docker {} {}", action, name);
        }
    }
}

/// Start the container detached and return its id.
pub async fn start(spec: &ContainerSpec) -> Result<String> {
    let output = Command::new("docker")
        .args(spec.run_args())
        .output()
        .await
        .context("Failed to run docker")?;

    if !output.status.success() {
        bail!(
            "docker run failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "qdrant_test".to_string(),
            image: "qdrant/qdrant:latest".to_string(),
            port: 7333,
            data_dir: PathBuf::from("/srv/qdrant_data"),
        }
    }

    #[test]
    fn test_run_args() {
        assert_eq!(
            spec().run_args(),
            vec![
                "run",
                "-d",
                "--name",
                "qdrant_test",
                "-p",
                "7333:6333",
                "-v",
                "/srv/qdrant_data:/qdrant/storage",
                "qdrant/qdrant:latest",
            ]
        );
    }

    #[test]
    fn test_command_line() {
        assert_eq!(
            spec().command_line(),
            "docker run -d --name qdrant_test -p 7333:6333 -v /srv/qdrant_data:/qdrant/storage qdrant/qdrant:latest"
        );
    }
}
