//! Detection source polling task.
//!
//! One owned task fetches the current batch on a fixed interval and applies
//! it to the shared dashboard. Each poll reserves a generation number before
//! its request goes out; the dashboard drops results older than the last one
//! it applied.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cropscan_common::config::Config;
use cropscan_common::protocol::DetectionsResponse;

use crate::state::{ConnectionState, SharedDashboard};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detection source returned HTTP {0}")]
    Status(u16),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("invalid detections payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can produce the current detection batch.
pub trait DetectionSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<DetectionsResponse, SourceError>> + Send;
}

/// `GET {base_url}/detections` over HTTP.
pub struct HttpDetectionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDetectionSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/detections", base_url.trim_end_matches('/')),
        })
    }
}

impl DetectionSource for HttpDetectionSource {
    async fn fetch(&self) -> Result<DetectionsResponse, SourceError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.poll_timeout(),
        }
    }
}

/// Poll until `cancel` fires. The first poll is issued immediately.
pub async fn run<S: DetectionSource>(
    source: S,
    dashboard: SharedDashboard,
    settings: PollerSettings,
    cancel: CancellationToken,
) {
    info!(
        "Polling detection source every {:?} (timeout {:?})",
        settings.interval, settings.timeout
    );

    loop {
        let generation = dashboard.write().await.begin_poll();

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = tokio::time::timeout(settings.timeout, source.fetch()) => {
                r.unwrap_or(Err(SourceError::Timeout(settings.timeout)))
            }
        };

        match result {
            Ok(batch) => {
                let count = batch.detections.len();
                if dashboard.write().await.apply_batch(generation, batch, Utc::now()) {
                    debug!("Applied batch {generation} ({count} raw item(s))");
                }
            }
            Err(e) => {
                let mut d = dashboard.write().await;
                let before = d.status().state;
                let after = d.record_failure(generation, &e.to_string());
                let failures = d.status().consecutive_failures;
                drop(d);

                if after == ConnectionState::Disconnected && before != ConnectionState::Disconnected {
                    error!("Detection source unreachable after {failures} attempt(s): {e}");
                } else {
                    warn!("Poll {generation} failed ({failures} in a row): {e}");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.interval) => {}
        }
    }

    info!("Poller stopped");
}
