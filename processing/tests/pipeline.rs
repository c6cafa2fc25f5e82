//! End-to-end run of the processing pipeline: wire JSON in, report out.

use chrono::{TimeZone, Utc};
use serde_json::json;

use cropscan_common::config::Config;
use cropscan_common::detection::normalize_batch;
use cropscan_processing::export::{JsonFileExporter, ReportExporter};
use cropscan_processing::path::generate_path;
use cropscan_processing::pipeline;
use cropscan_processing::report::{aggregate, FusionResult, MissionMetadata, MissionReport, ReportInputs};

/// Centre of cell (row, col) of the default 10x10 grid.
fn cell_centre(row: usize, col: usize) -> (f64, f64) {
    (11.0 + 0.001 * (row as f64 + 0.5), 77.0 + 0.001 * (col as f64 + 0.5))
}

#[test]
fn batch_to_report() {
    let config = Config::default();
    let pipeline_config = config.pipeline().unwrap();

    let (a_lat, a_lng) = cell_centre(0, 3);
    let (b_lat, b_lng) = cell_centre(1, 1);
    let (c_lat, c_lng) = cell_centre(1, 7);
    let (h_lat, h_lng) = cell_centre(5, 5);

    let wire = vec![
        json!({"id": "a", "disease": "leaf_blight", "confidence": 0.91, "lat": a_lat, "lng": a_lng}),
        json!({"id": "b", "disease": "brown_spot", "confidence": 0.72, "position": {"lat": b_lat, "lng": b_lng}}),
        json!({"frame_id": 40, "detections": [
            {"class_name": "leaf_blight", "confidence": 0.66, "latitude": c_lat, "longitude": c_lng},
            {"class_name": "healthy", "confidence": 0.95, "lat": h_lat, "lng": h_lng}
        ]}),
        json!({"id": "low", "disease": "leaf_blight", "confidence": 0.1, "lat": a_lat, "lng": a_lng}),
        json!({"id": "nolabel", "confidence": 0.9, "lat": a_lat, "lng": a_lng}),
        json!({"id": "far", "disease": "leaf_blight", "confidence": 0.9, "lat": 12.0, "lng": 78.0}),
        json!("garbage"),
    ];

    let detections = normalize_batch(&wire, &pipeline_config.bounds, &pipeline_config.normalize);
    assert_eq!(detections.len(), 5, "low-confidence, unlabelled and malformed items are dropped");

    let output = pipeline::run(&detections, &pipeline_config);
    let counted: usize = output.grid.cells.iter().map(|c| c.detection_count).sum();
    assert_eq!(counted, 4, "the out-of-field detection is not bucketed");
    assert_eq!(output.stats.infected_count, 3);
    assert_eq!(output.stats.infected_percentage, 3.0);
    assert_eq!(output.stats.chemical_savings, 97.0);

    let path = generate_path(&output.grid, &pipeline_config.path);
    let order: Vec<(usize, usize)> = path.waypoints.iter().map(|w| (w.row, w.col)).collect();
    assert_eq!(order, vec![(0, 3), (1, 7), (1, 1)]);
    assert!(path.total_distance > 0.0);

    let meta = MissionMetadata {
        mission_id: "IT-1".into(),
        ..MissionMetadata::default()
    };
    let fusion = vec![FusionResult {
        frame_id: Some(40),
        refined_diagnosis: Some("Leaf blight".into()),
        severity: Some("high".into()),
        confidence: Some(0.66),
        recommendation: Some("Spray copper fungicide".into()),
    }];
    let at = Utc.with_ymd_and_hms(2026, 7, 1, 6, 0, 0).unwrap();
    let mut inputs = ReportInputs::new(&meta, &detections, at);
    inputs.grid_stats = Some(&output.stats);
    inputs.spray_path = Some(&path);
    inputs.economics = Some(&output.economics);
    inputs.fusion_results = Some(fusion.as_slice());
    let report = aggregate(&inputs);

    assert_eq!(report.summary.total_detections, 5);
    assert_eq!(report.summary.infected_cells, 3);
    assert_eq!(report.top_diagnosis, "Leaf blight");
    assert_eq!(report.spray_path, path);
    assert_eq!(report.economic, output.economics);

    let dir = std::env::temp_dir().join("cropscan_pipeline_it");
    let _ = std::fs::remove_dir_all(&dir);
    let written = JsonFileExporter::new(&dir).export(&report).unwrap();
    let back: MissionReport =
        serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(back, report);
    std::fs::remove_dir_all(&dir).ok();
}
