//! One-shot HTTP fetch of the detection source's current batch.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use cropscan_common::protocol::{DetectionsResponse, StatusResponse};

/// `GET {base_url}/detections`, blocking.
pub fn fetch_detections(base_url: &str, timeout: Duration) -> Result<DetectionsResponse> {
    let body: DetectionsResponse = get_json(&detections_url(base_url), timeout)?;
    debug!(
        "Fetched {} raw detection(s) (session {:?})",
        body.detections.len(),
        body.session_id
    );
    Ok(body)
}

/// `GET {base_url}/status`, blocking: what the source is analysing now.
pub fn fetch_status(base_url: &str, timeout: Duration) -> Result<StatusResponse> {
    get_json(&endpoint_url(base_url, "status"), timeout)
}

fn get_json<T: DeserializeOwned>(url: &str, timeout: Duration) -> Result<T> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("Cannot create HTTP client")?;

    let resp = client.get(url).send().with_context(|| format!("GET {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("GET {} returned {}", url, resp.status());
    }

    resp.json().with_context(|| format!("Parse JSON from {url}"))
}

pub fn detections_url(base_url: &str) -> String {
    endpoint_url(base_url, "detections")
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!("{}/{endpoint}", base_url.trim_end_matches('/'))
}
