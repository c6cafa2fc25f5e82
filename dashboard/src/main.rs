//! CropScan Dashboard – polls the detection source and serves the live
//! field picture over HTTP.
//!
//! This binary:
//! 1. Reads configuration from `cropscan.conf` (and `MISSION_FILE`)
//! 2. Polls `DETECTION_SOURCE_URL` on a fixed interval
//! 3. Runs an axum HTTP server exposing grid, statistics, spray path,
//!    economics and mission reports.

mod poller;
mod server;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use cropscan_common::config::{self, Config};
use cropscan_processing::export::JsonFileExporter;
use cropscan_processing::mission;

use crate::poller::{HttpDetectionSource, PollerSettings};
use crate::server::AppState;
use crate::state::Dashboard;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Config::default_path().to_string());
    let config = config::load(&PathBuf::from(&config_path)).context("Config load failed")?;
    let (pipeline, metadata) = mission::resolve(&config)?;

    info!(
        "CropScan Dashboard starting (listen={}, source={})",
        config.dashboard_listen_addr, config.detection_source_url
    );

    std::fs::create_dir_all(&config.report_dir)
        .with_context(|| format!("Cannot create report dir {}", config.report_dir.display()))?;

    // ── ctrl-c ───────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        on_signal.cancel();
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── start poller ─────────────────────────────────────────────────
    let dashboard = Dashboard::new(pipeline, metadata, config.max_poll_failures).shared();
    let source = HttpDetectionSource::new(&config.detection_source_url, config.poll_timeout())
        .context("Cannot create HTTP client")?;
    let poller_handle = tokio::spawn(poller::run(
        source,
        dashboard.clone(),
        PollerSettings::from_config(&config),
        cancel.clone(),
    ));

    // ── start HTTP server ────────────────────────────────────────────
    let state = AppState {
        dashboard,
        exporter: Arc::new(JsonFileExporter::new(&config.report_dir)),
        report_dir: config.report_dir.clone(),
    };
    let served = server::run(state, &config.dashboard_listen_addr, cancel.clone()).await;

    // Stop the poller even when the server failed to start
    cancel.cancel();
    let _ = poller_handle.await;
    served?;

    info!("CropScan Dashboard stopped");
    Ok(())
}
