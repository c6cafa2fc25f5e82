//! Live dashboard state: the latest detection batch and everything derived
//! from it.
//!
//! Derived values are rebuilt wholesale whenever a batch is applied, so a
//! reader never sees a grid from one batch next to statistics from another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use cropscan_common::config::PipelineConfig;
use cropscan_common::detection::{normalize_batch, Detection};
use cropscan_common::protocol::DetectionsResponse;
use cropscan_processing::economics::EconomicImpact;
use cropscan_processing::path::{generate_path, SprayPath};
use cropscan_processing::pipeline::{self, PipelineOutput};
use cropscan_processing::report::{
    aggregate, lenient_list, lenient_object, Alert, FusionResult, MissionMetadata, MissionReport,
    ReportInputs, SensorData,
};

pub type SharedDashboard = Arc<RwLock<Dashboard>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No poll has completed yet.
    Connecting,
    Connected,
    /// Failing, still below the failure threshold.
    Reconnecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<String>,
}

/// Optional report inputs supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportRequest {
    #[serde(deserialize_with = "lenient_object")]
    pub sensor_data: Option<SensorData>,
    #[serde(deserialize_with = "lenient_list")]
    pub fusion_results: Option<Vec<FusionResult>>,
    #[serde(deserialize_with = "lenient_list")]
    pub alerts: Option<Vec<Alert>>,
    /// Economic figures from an older client, in any of its historical
    /// field spellings. Replaces the computed estimate when recognizable.
    #[serde(alias = "economics")]
    pub economic_data: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct Dashboard {
    pipeline: PipelineConfig,
    metadata: MissionMetadata,
    max_failures: u32,

    session_id: Option<String>,
    detections: Vec<Detection>,
    output: PipelineOutput,
    spray_path: Option<SprayPath>,

    next_generation: u64,
    last_applied: u64,
    status: ConnectionStatus,
}

impl Dashboard {
    pub fn new(pipeline: PipelineConfig, metadata: MissionMetadata, max_failures: u32) -> Self {
        let output = pipeline::run(&[], &pipeline);
        Self {
            pipeline,
            metadata,
            max_failures: max_failures.max(1),
            session_id: None,
            detections: Vec::new(),
            output,
            spray_path: None,
            next_generation: 0,
            last_applied: 0,
            status: ConnectionStatus {
                state: ConnectionState::Connecting,
                consecutive_failures: 0,
                last_error: None,
                last_success: None,
            },
        }
    }

    pub fn shared(self) -> SharedDashboard {
        Arc::new(RwLock::new(self))
    }

    /// Reserve the generation number for a poll about to be issued.
    pub fn begin_poll(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Apply a fetched batch. Returns `false` (and changes nothing) when a
    /// newer poll has already been applied.
    pub fn apply_batch(&mut self, generation: u64, batch: DetectionsResponse, now: DateTime<Utc>) -> bool {
        if generation <= self.last_applied {
            debug!(
                "Discarding stale batch (generation {generation}, last applied {})",
                self.last_applied
            );
            return false;
        }

        if batch.session_id != self.session_id {
            if self.spray_path.take().is_some() {
                info!("Session changed to {:?}, spray path cleared", batch.session_id);
            }
            self.session_id = batch.session_id;
        }

        self.detections = normalize_batch(&batch.detections, &self.pipeline.bounds, &self.pipeline.normalize);
        self.output = pipeline::run(&self.detections, &self.pipeline);
        self.last_applied = generation;

        if self.status.state != ConnectionState::Connected {
            info!("Connected to detection source");
        }
        self.status = ConnectionStatus {
            state: ConnectionState::Connected,
            consecutive_failures: 0,
            last_error: None,
            last_success: Some(now.to_rfc3339()),
        };
        true
    }

    /// Record a failed poll. Failures of polls older than the last applied
    /// batch are ignored. Returns the resulting connection state.
    pub fn record_failure(&mut self, generation: u64, error: &str) -> ConnectionState {
        if generation <= self.last_applied {
            return self.status.state;
        }
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        self.status.last_error = Some(error.to_string());
        self.status.state = if self.status.consecutive_failures >= self.max_failures {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Reconnecting
        };
        self.status.state
    }

    pub fn generate_spray_path(&mut self) -> &SprayPath {
        let path = generate_path(&self.output.grid, &self.pipeline.path);
        info!(
            "Spray path generated: {} waypoint(s), {:.0} m",
            path.waypoints.len(),
            path.total_distance
        );
        self.spray_path.insert(path)
    }

    pub fn clear_spray_path(&mut self) {
        self.spray_path = None;
    }

    pub fn build_report(&self, request: &ReportRequest, now: DateTime<Utc>) -> MissionReport {
        let mut metadata = self.metadata.clone();
        metadata.session_id = self.session_id.clone();

        let economics = request
            .economic_data
            .as_ref()
            .and_then(EconomicImpact::from_legacy)
            .unwrap_or(self.output.economics);

        let mut inputs = ReportInputs::new(&metadata, &self.detections, now);
        inputs.grid_stats = Some(&self.output.stats);
        inputs.spray_path = self.spray_path.as_ref();
        inputs.economics = Some(&economics);
        inputs.sensor_data = request.sensor_data.as_ref();
        inputs.fusion_results = request.fusion_results.as_deref();
        inputs.alerts = request.alerts.as_deref();
        aggregate(&inputs)
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.last_applied
    }

    pub fn metadata(&self) -> &MissionMetadata {
        &self.metadata
    }

    pub fn currency(&self) -> &str {
        &self.pipeline.rates.currency
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn output(&self) -> &PipelineOutput {
        &self.output
    }

    pub fn spray_path(&self) -> Option<&SprayPath> {
        self.spray_path.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropscan_common::config::Config;
    use serde_json::json;

    fn dashboard(max_failures: u32) -> Dashboard {
        let pipeline = Config::default().pipeline().unwrap();
        Dashboard::new(pipeline, MissionMetadata::default(), max_failures)
    }

    /// One infected detection in the bottom-left cell of the default field.
    fn batch(session: Option<&str>) -> DetectionsResponse {
        DetectionsResponse {
            session_id: session.map(str::to_string),
            detections: vec![json!({
                "id": "d1", "disease": "leaf_blight", "confidence": 0.9,
                "lat": 11.0005, "lng": 77.0005
            })],
        }
    }

    #[test]
    fn test_initial_state() {
        let d = dashboard(3);
        assert_eq!(d.status().state, ConnectionState::Connecting);
        assert_eq!(d.output().stats.total_cells, 100);
        assert_eq!(d.generation(), 0);
        assert!(d.spray_path().is_none());
    }

    #[test]
    fn test_apply_batch_rebuilds_everything() {
        let mut d = dashboard(3);
        let g = d.begin_poll();
        assert!(d.apply_batch(g, batch(Some("s1")), Utc::now()));
        assert_eq!(d.detections().len(), 1);
        assert_eq!(d.output().stats.infected_count, 1);
        assert!(d.output().economics.treatment_cost > 0.0);
        assert_eq!(d.session_id(), Some("s1"));
        assert_eq!(d.status().state, ConnectionState::Connected);
    }

    #[test]
    fn test_stale_generation_discarded() {
        let mut d = dashboard(3);
        let older = d.begin_poll();
        let newer = d.begin_poll();
        assert!(d.apply_batch(newer, batch(Some("new")), Utc::now()));
        assert!(!d.apply_batch(older, DetectionsResponse::default(), Utc::now()));
        assert_eq!(d.session_id(), Some("new"));
        assert_eq!(d.detections().len(), 1);
        assert_eq!(d.generation(), newer);

        // a late failure from the older poll does not degrade the status
        assert_eq!(d.record_failure(older, "timeout"), ConnectionState::Connected);
    }

    #[test]
    fn test_failure_threshold() {
        let mut d = dashboard(3);
        let g = d.begin_poll();
        d.apply_batch(g, batch(None), Utc::now());

        for expected in [
            ConnectionState::Reconnecting,
            ConnectionState::Reconnecting,
            ConnectionState::Disconnected,
        ] {
            let g = d.begin_poll();
            assert_eq!(d.record_failure(g, "connection refused"), expected);
        }
        assert_eq!(d.status().consecutive_failures, 3);
        // last good state retained
        assert_eq!(d.detections().len(), 1);

        let g = d.begin_poll();
        d.apply_batch(g, batch(None), Utc::now());
        assert_eq!(d.status().state, ConnectionState::Connected);
        assert_eq!(d.status().consecutive_failures, 0);
    }

    #[test]
    fn test_session_change_clears_path() {
        let mut d = dashboard(3);
        let g = d.begin_poll();
        d.apply_batch(g, batch(Some("s1")), Utc::now());
        assert!(d.generate_spray_path().path_exists);

        // same session: path kept until regenerated
        let g = d.begin_poll();
        d.apply_batch(g, batch(Some("s1")), Utc::now());
        assert!(d.spray_path().is_some());

        let g = d.begin_poll();
        d.apply_batch(g, batch(Some("s2")), Utc::now());
        assert!(d.spray_path().is_none());
    }

    #[test]
    fn test_build_report() {
        let mut d = dashboard(3);
        let g = d.begin_poll();
        d.apply_batch(g, batch(Some("s9")), Utc::now());
        d.generate_spray_path();

        let report = d.build_report(&ReportRequest::default(), Utc::now());
        assert_eq!(report.metadata.session_id.as_deref(), Some("s9"));
        assert_eq!(report.summary.total_detections, 1);
        assert!(report.spray_path.path_exists);
        assert_eq!(report.economic, d.output().economics);

        let legacy: ReportRequest =
            serde_json::from_value(json!({"economicData": {"estimatedLoss": 900, "treatmentCost": 300}}))
                .unwrap();
        let report = d.build_report(&legacy, Utc::now());
        assert_eq!(report.economic.crop_loss_untreated, 900.0);
        assert_eq!(report.economic.roi, 200.0);
    }
}
