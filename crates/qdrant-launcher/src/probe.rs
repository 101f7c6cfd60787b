//! Connectivity check against a running Qdrant.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// Collection listing endpoint
pub fn collections_url(host: &str, port: u16) -> String {
    format!("http://{}:{}/collections", host, port)
}

/// Number of collections the server reports.
pub async fn count_collections(host: &str, port: u16) -> Result<usize> {
    let url = collections_url(host, port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("No response from {}", url))?
        .error_for_status()?;

    let body: Value = response.json().await.context("Response was not JSON")?;
    parse_collections(&body)
}

/// Read `result.collections` from a `/collections` response.
pub fn parse_collections(body: &Value) -> Result<usize> {
    body.get("result")
        .and_then(|r| r.get("collections"))
        .and_then(Value::as_array)
        .map(Vec::len)
        .ok_or_else(|| anyhow!("Unexpected /collections response: {}", body))
}
