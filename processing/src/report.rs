//! Mission report aggregation.
//!
//! Merges grid statistics, the spray path, the economic estimate and the
//! raw detections into one owned, serializable document. Optional inputs
//! degrade to `"N/A"`, empty lists or zeros; aggregation never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use cropscan_common::detection::Detection;

use crate::economics::EconomicImpact;
use crate::path::SprayPath;
use crate::stats::GridStats;

/// Alerts kept in a report.
pub const MAX_ALERTS: usize = 10;
/// Detail rows kept in a report.
pub const MAX_DETAIL_ROWS: usize = 50;

const NOT_AVAILABLE: &str = "N/A";
const NO_DETECTIONS: &str = "No detections";

// ─── inputs ──────────────────────────────────────────────────────────────────

/// Static description of the mission, fixed for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionMetadata {
    pub mission_id: String,
    pub field_name: String,
    pub operator: String,
    pub drone_id: String,
    pub crop_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
}

impl Default for MissionMetadata {
    fn default() -> Self {
        Self {
            mission_id: "mission-001".into(),
            field_name: "Unnamed field".into(),
            operator: NOT_AVAILABLE.into(),
            drone_id: NOT_AVAILABLE.into(),
            crop_type: NOT_AVAILABLE.into(),
            session_id: None,
            started_at: None,
        }
    }
}

/// A sensor value as sent by the field station: a number, or already
/// formatted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl Reading {
    fn render(&self, unit: &str) -> String {
        match self {
            Reading::Number(v) => format!("{v:.1}{unit}"),
            Reading::Text(s) if s.trim().is_empty() => NOT_AVAILABLE.to_string(),
            Reading::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    #[serde(default, deserialize_with = "lenient_reading")]
    pub temperature: Option<Reading>,
    #[serde(default, deserialize_with = "lenient_reading")]
    pub humidity: Option<Reading>,
    #[serde(default, alias = "soil_moisture", deserialize_with = "lenient_reading")]
    pub soil_moisture: Option<Reading>,
    #[serde(default, alias = "wind_speed", deserialize_with = "lenient_reading")]
    pub wind_speed: Option<Reading>,
}

/// Booleans, objects and other stray types are treated as absent.
fn lenient_reading<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Reading>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(Reading::Number),
        Some(serde_json::Value::String(s)) => Some(Reading::Text(s)),
        _ => None,
    })
}

/// Refined per-detection result from the (external) fusion stage.
///
/// Callers disagree on field types; anything unusable reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    #[serde(default, alias = "frameId", deserialize_with = "lenient_u64")]
    pub frame_id: Option<u64>,
    #[serde(default, alias = "refinedDiagnosis", deserialize_with = "lenient_text")]
    pub refined_diagnosis: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default = "default_alert_level", deserialize_with = "lenient_level")]
    pub level: String,
    #[serde(default, alias = "text", deserialize_with = "lenient_message")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub timestamp: Option<String>,
}

fn default_alert_level() -> String {
    "info".to_string()
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_level<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_text(d)?.unwrap_or_else(default_alert_level))
}

/// Numbers are rendered as text; other stray types become empty.
fn lenient_message<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `0.87`, `"0.87"` and `"87%"` all read as 0.87.
fn lenient_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    let c = match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };
    Ok(c.filter(|c| c.is_finite()))
}

/// A list of optional report inputs. A non-list reads as absent and
/// unreadable entries are skipped, so one bad entry never rejects a report.
pub fn lenient_list<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| match serde_json::from_value(item) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!("Skipping unreadable report entry #{i}: {e}");
                        None
                    }
                })
                .collect(),
        ),
        None | Some(serde_json::Value::Null) => None,
        Some(other) => {
            warn!("Expected a list of report entries, got {other}");
            None
        }
    })
}

/// A single optional report input; anything unreadable reads as absent.
pub fn lenient_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => match serde_json::from_value(value) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Ignoring unreadable report input: {e}");
                None
            }
        },
    })
}

/// Everything the aggregator reads. Only `metadata`, `detections` and
/// `generated_at` are required.
#[derive(Debug, Clone)]
pub struct ReportInputs<'a> {
    pub metadata: &'a MissionMetadata,
    pub detections: &'a [Detection],
    pub generated_at: DateTime<Utc>,
    pub grid_stats: Option<&'a GridStats>,
    pub spray_path: Option<&'a SprayPath>,
    pub economics: Option<&'a EconomicImpact>,
    pub sensor_data: Option<&'a SensorData>,
    pub fusion_results: Option<&'a [FusionResult]>,
    pub alerts: Option<&'a [Alert]>,
}

impl<'a> ReportInputs<'a> {
    pub fn new(metadata: &'a MissionMetadata, detections: &'a [Detection], generated_at: DateTime<Utc>) -> Self {
        Self {
            metadata,
            detections,
            generated_at,
            grid_stats: None,
            spray_path: None,
            economics: None,
            sensor_data: None,
            fusion_results: None,
            alerts: None,
        }
    }
}

// ─── output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Unknown or missing severities fall into `Low`.
    pub fn bucket(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") => Severity::Critical,
            Some("high") => Severity::High,
            Some("medium") | Some("moderate") => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityBreakdown {
    fn add(&mut self, s: Severity) {
        match s {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub total_detections: usize,
    /// Per-label counts in first-seen order.
    pub label_counts: Vec<LabelCount>,
    pub average_confidence: f64,
    pub total_cells: usize,
    pub infected_cells: usize,
    pub infected_percentage: f64,
    pub chemical_savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalSnapshot {
    pub temperature: String,
    pub humidity: String,
    pub soil_moisture: String,
    pub wind_speed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub index: usize,
    pub frame_id: Option<u64>,
    pub diagnosis: String,
    pub severity: Severity,
    pub confidence: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionReport {
    pub metadata: MissionMetadata,
    pub generated_at: String,
    pub summary: DetectionSummary,
    pub environmental: EnvironmentalSnapshot,
    pub spray_path: SprayPath,
    pub economic: EconomicImpact,
    pub severity_breakdown: SeverityBreakdown,
    pub top_diagnosis: String,
    pub alerts: Vec<Alert>,
    pub details_table: Vec<DetailRow>,
}

// ─── aggregation ─────────────────────────────────────────────────────────────

pub fn aggregate(inputs: &ReportInputs<'_>) -> MissionReport {
    let fusion = inputs.fusion_results.unwrap_or(&[]);

    MissionReport {
        metadata: inputs.metadata.clone(),
        generated_at: inputs.generated_at.to_rfc3339(),
        summary: summarize(inputs.detections, inputs.grid_stats),
        environmental: environmental(inputs.sensor_data),
        spray_path: inputs.spray_path.cloned().unwrap_or_else(SprayPath::empty),
        economic: inputs.economics.copied().unwrap_or_default(),
        severity_breakdown: severity_breakdown(fusion),
        top_diagnosis: top_diagnosis(fusion),
        alerts: inputs
            .alerts
            .unwrap_or(&[])
            .iter()
            .take(MAX_ALERTS)
            .cloned()
            .collect(),
        details_table: fusion
            .iter()
            .take(MAX_DETAIL_ROWS)
            .enumerate()
            .map(|(i, f)| detail_row(i + 1, f))
            .collect(),
    }
}

fn summarize(detections: &[Detection], stats: Option<&GridStats>) -> DetectionSummary {
    let mut label_counts: Vec<LabelCount> = Vec::new();
    for d in detections {
        match label_counts.iter_mut().find(|c| c.label == d.disease_label) {
            Some(c) => c.count += 1,
            None => label_counts.push(LabelCount {
                label: d.disease_label.clone(),
                count: 1,
            }),
        }
    }

    let average_confidence = if detections.is_empty() {
        0.0
    } else {
        let mean = detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64;
        (mean * 10000.0).round() / 10000.0
    };

    let stats = stats.copied().unwrap_or_default();
    DetectionSummary {
        total_detections: detections.len(),
        label_counts,
        average_confidence,
        total_cells: stats.total_cells,
        infected_cells: stats.infected_count,
        infected_percentage: stats.infected_percentage,
        chemical_savings: stats.chemical_savings,
    }
}

fn environmental(sensor: Option<&SensorData>) -> EnvironmentalSnapshot {
    let render = |r: Option<&Reading>, unit: &str| {
        r.map(|r| r.render(unit)).unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };
    let s = sensor.cloned().unwrap_or_default();
    EnvironmentalSnapshot {
        temperature: render(s.temperature.as_ref(), "°C"),
        humidity: render(s.humidity.as_ref(), "%"),
        soil_moisture: render(s.soil_moisture.as_ref(), "%"),
        wind_speed: render(s.wind_speed.as_ref(), " m/s"),
    }
}

fn severity_breakdown(fusion: &[FusionResult]) -> SeverityBreakdown {
    let mut b = SeverityBreakdown::default();
    for f in fusion {
        b.add(Severity::bucket(f.severity.as_deref()));
    }
    b
}

/// Most frequent refined diagnosis; the first one encountered wins ties.
fn top_diagnosis(fusion: &[FusionResult]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for diag in fusion
        .iter()
        .filter_map(|f| f.refined_diagnosis.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        match counts.iter_mut().find(|(d, _)| *d == diag) {
            Some((_, n)) => *n += 1,
            None => counts.push((diag, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (d, n) in counts {
        if best.map_or(true, |(_, bn)| n > bn) {
            best = Some((d, n));
        }
    }
    best.map(|(d, _)| d.to_string())
        .unwrap_or_else(|| NO_DETECTIONS.to_string())
}

fn detail_row(index: usize, f: &FusionResult) -> DetailRow {
    DetailRow {
        index,
        frame_id: f.frame_id,
        diagnosis: f
            .refined_diagnosis
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        severity: Severity::bucket(f.severity.as_deref()),
        confidence: f
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| format!("{:.0}%", c.clamp(0.0, 1.0) * 100.0))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        recommendation: f
            .recommendation
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    }
}
