//! CropScan Processing – one-shot mission analysis.
//!
//! Usage: `cropscan-processing [CONFIG] [DETECTIONS_JSON]`
//!
//! Without a detections file the current batch is fetched from
//! `DETECTION_SOURCE_URL`. The resulting mission report is written to
//! `REPORT_DIR`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use cropscan_common::config::{self, Config};
use cropscan_common::detection::normalize_batch;
use cropscan_common::protocol::DetectionsResponse;

use cropscan_processing::client;
use cropscan_processing::export::{JsonFileExporter, ReportExporter};
use cropscan_processing::mission;
use cropscan_processing::path::generate_path;
use cropscan_processing::pipeline;
use cropscan_processing::report::{aggregate, ReportInputs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .unwrap_or_else(|| Config::default_path().to_string());
    let config = config::load(&PathBuf::from(&config_path)).context("Config load failed")?;
    let (pipeline_config, mut metadata) = mission::resolve(&config)?;

    info!(
        "CropScan Processing starting (mission={}, grid={}x{})",
        metadata.mission_id, pipeline_config.resolution.rows, pipeline_config.resolution.cols
    );

    // ── acquire detections ───────────────────────────────────────────
    let batch = match args.next() {
        Some(file) => read_batch(Path::new(&file))?,
        None => {
            match client::fetch_status(&config.detection_source_url, config.poll_timeout()) {
                Ok(status) => info!(
                    "Detection source running={} (session {:?}, video {:?})",
                    status.running, status.session_id, status.video_name
                ),
                Err(e) => debug!("No status from detection source: {e:#}"),
            }
            client::fetch_detections(&config.detection_source_url, config.poll_timeout())
                .with_context(|| format!("Cannot fetch detections from {}", config.detection_source_url))?
        }
    };
    metadata.session_id = batch.session_id.clone();

    let detections = normalize_batch(&batch.detections, &pipeline_config.bounds, &pipeline_config.normalize);
    info!(
        "{} of {} raw detection(s) usable",
        detections.len(),
        batch.detections.len()
    );

    // ── analyse ──────────────────────────────────────────────────────
    let output = pipeline::run(&detections, &pipeline_config);
    let path = generate_path(&output.grid, &pipeline_config.path);

    info!(
        "{}/{} cell(s) infected ({:.1}%), {} waypoint(s), {:.0} m",
        output.stats.infected_count,
        output.stats.total_cells,
        output.stats.infected_percentage,
        path.waypoints.len(),
        path.total_distance
    );

    // ── report ───────────────────────────────────────────────────────
    let mut inputs = ReportInputs::new(&metadata, &detections, Utc::now());
    inputs.grid_stats = Some(&output.stats);
    inputs.spray_path = Some(&path);
    inputs.economics = Some(&output.economics);
    let report = aggregate(&inputs);

    let written = JsonFileExporter::new(&config.report_dir).export(&report)?;
    info!(
        "Done: expected savings {:.0} {} (ROI {:.0}%), report {}",
        output.economics.expected_savings,
        pipeline_config.rates.currency,
        output.economics.roi,
        written.display()
    );
    Ok(())
}

/// Read a detection batch from disk: either a `{session_id, detections}`
/// document or a bare array of detections.
fn read_batch(path: &Path) -> Result<DetectionsResponse> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read detections file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    match value {
        serde_json::Value::Array(detections) => Ok(DetectionsResponse {
            session_id: None,
            detections,
        }),
        other => serde_json::from_value(other)
            .with_context(|| format!("Unexpected detections document in {}", path.display())),
    }
}
