//! Configuration parsing – reads a KEY=VALUE file (`cropscan.conf`).
//!
//! The processing binary and the dashboard load the same file; each
//! ignores fields it does not need. Domain assumptions (grid resolution,
//! cost rates, drone speed) live here rather than inline in the pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::detection::NormalizeOptions;
use crate::geo::{BoundsError, FieldBounds};

/// Application configuration, shared between processing and dashboard.
#[derive(Debug, Clone)]
pub struct Config {
    // ── detection source ─────────────────────────────────────────────
    pub detection_source_url: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    /// Consecutive failed polls before the connection is reported lost.
    pub max_poll_failures: u32,

    // ── dashboard ────────────────────────────────────────────────────
    pub dashboard_listen_addr: String,

    // ── field ────────────────────────────────────────────────────────
    pub field_min_lat: f64,
    pub field_max_lat: f64,
    pub field_min_lng: f64,
    pub field_max_lng: f64,
    pub grid_rows: usize,
    pub grid_cols: usize,

    // ── flight ───────────────────────────────────────────────────────
    pub drone_speed_mps: f64,
    pub waypoint_overhead_secs: f64,

    // ── economics ────────────────────────────────────────────────────
    pub loss_rate_per_ha: f64,
    pub treatment_rate_per_ha: f64,
    pub chemical_dose_l_per_ha: f64,
    pub currency: String,

    // ── detection filtering ──────────────────────────────────────────
    pub min_confidence: f64,
    pub simulate_gps: bool,

    // ── files ────────────────────────────────────────────────────────
    pub mission_file: Option<PathBuf>,
    pub report_dir: PathBuf,
}

/// Grid partition of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridResolution {
    pub rows: usize,
    pub cols: usize,
}

impl GridResolution {
    pub fn total_cells(&self) -> usize {
        self.rows * self.cols
    }
}

/// Flight assumptions used to estimate spray-path duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathParams {
    pub speed_mps: f64,
    pub waypoint_overhead_secs: f64,
}

/// Per-hectare monetary and chemical rates.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicRates {
    pub loss_rate_per_ha: f64,
    pub treatment_rate_per_ha: f64,
    pub chemical_dose_l_per_ha: f64,
    pub currency: String,
}

/// Everything the pure pipeline needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub bounds: FieldBounds,
    pub resolution: GridResolution,
    pub path: PathParams,
    pub rates: EconomicRates,
    pub normalize: NormalizeOptions,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid field bounds: {0}")]
    Bounds(#[from] BoundsError),
    #[error("grid resolution must be at least 1x1, got {rows}x{cols}")]
    Resolution { rows: usize, cols: usize },
    #[error("{key} must be a positive number, got {value}")]
    NotPositive { key: &'static str, value: f64 },
    #[error("{key} must not be negative, got {value}")]
    Negative { key: &'static str, value: f64 },
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/cropscan/cropscan.conf"
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn field_bounds(&self) -> Result<FieldBounds, BoundsError> {
        FieldBounds::new(
            self.field_min_lat,
            self.field_max_lat,
            self.field_min_lng,
            self.field_max_lng,
        )
    }

    /// Typed, validated view for the pipeline.
    pub fn pipeline(&self) -> Result<PipelineConfig, ConfigError> {
        let bounds = self.field_bounds()?;

        if self.grid_rows == 0 || self.grid_cols == 0 {
            return Err(ConfigError::Resolution {
                rows: self.grid_rows,
                cols: self.grid_cols,
            });
        }
        if !(self.drone_speed_mps > 0.0) {
            return Err(ConfigError::NotPositive {
                key: "DRONE_SPEED_MPS",
                value: self.drone_speed_mps,
            });
        }
        for (key, value) in [
            ("WAYPOINT_OVERHEAD_SECS", self.waypoint_overhead_secs),
            ("LOSS_RATE_PER_HA", self.loss_rate_per_ha),
            ("TREATMENT_RATE_PER_HA", self.treatment_rate_per_ha),
            ("CHEMICAL_DOSE_L_PER_HA", self.chemical_dose_l_per_ha),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::Negative { key, value });
            }
        }

        Ok(PipelineConfig {
            bounds,
            resolution: GridResolution {
                rows: self.grid_rows,
                cols: self.grid_cols,
            },
            path: PathParams {
                speed_mps: self.drone_speed_mps,
                waypoint_overhead_secs: self.waypoint_overhead_secs,
            },
            rates: EconomicRates {
                loss_rate_per_ha: self.loss_rate_per_ha,
                treatment_rate_per_ha: self.treatment_rate_per_ha,
                chemical_dose_l_per_ha: self.chemical_dose_l_per_ha,
                currency: self.currency.clone(),
            },
            normalize: NormalizeOptions {
                min_confidence: self.min_confidence.clamp(0.0, 1.0),
                simulate_gps: self.simulate_gps,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        from_map(&HashMap::new())
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let map = parse_conf(&text);
    info!("Loaded config from {}", path.display());
    Ok(from_map(&map))
}

fn from_map(map: &HashMap<String, String>) -> Config {
    let get = |key: &str| -> Option<String> { map.get(key).cloned() };
    let get_f64 = |key: &str, default: f64| -> f64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_bool = |key: &str, default: bool| -> bool {
        get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
            .unwrap_or(default)
    };

    Config {
        detection_source_url: get("DETECTION_SOURCE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:5000".into()),
        poll_interval_ms: get_u64("POLL_INTERVAL_MS", 2500),
        poll_timeout_secs: get_u64("POLL_TIMEOUT_SECS", 10),
        max_poll_failures: get("MAX_POLL_FAILURES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),

        dashboard_listen_addr: get("DASHBOARD_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8090".into()),

        field_min_lat: get_f64("FIELD_MIN_LAT", 11.0),
        field_max_lat: get_f64("FIELD_MAX_LAT", 11.01),
        field_min_lng: get_f64("FIELD_MIN_LNG", 77.0),
        field_max_lng: get_f64("FIELD_MAX_LNG", 77.01),
        grid_rows: get_u64("GRID_ROWS", 10) as usize,
        grid_cols: get_u64("GRID_COLS", 10) as usize,

        drone_speed_mps: get_f64("DRONE_SPEED_MPS", 5.0),
        waypoint_overhead_secs: get_f64("WAYPOINT_OVERHEAD_SECS", 10.0),

        loss_rate_per_ha: get_f64("LOSS_RATE_PER_HA", 25_000.0),
        treatment_rate_per_ha: get_f64("TREATMENT_RATE_PER_HA", 3_000.0),
        chemical_dose_l_per_ha: get_f64("CHEMICAL_DOSE_L_PER_HA", 2.0),
        currency: get("CURRENCY").unwrap_or_else(|| "INR".into()),

        min_confidence: get_f64("MIN_CONFIDENCE", 0.25),
        simulate_gps: get_bool("SIMULATE_GPS", true),

        mission_file: get("MISSION_FILE").filter(|s| !s.is_empty()).map(PathBuf::from),
        report_dir: PathBuf::from(get("REPORT_DIR").unwrap_or_else(|| "./reports".into())),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
FIELD_MIN_LAT=12.5
DETECTION_SOURCE_URL="http://edge:5000/"
GRID_ROWS=8
DASHBOARD_LISTEN_ADDR=0.0.0.0:9090
"#;
        let map = parse_conf(text);
        assert_eq!(map["FIELD_MIN_LAT"], "12.5");
        assert_eq!(map["DETECTION_SOURCE_URL"], "http://edge:5000/");
        assert_eq!(map["DASHBOARD_LISTEN_ADDR"], "0.0.0.0:9090");

        let config = from_map(&map);
        assert_eq!(config.detection_source_url, "http://edge:5000");
        assert_eq!(config.grid_rows, 8);
        assert_eq!(config.grid_cols, 10);
    }

    #[test]
    fn test_defaults_produce_valid_pipeline() {
        let p = Config::default().pipeline().unwrap();
        assert_eq!(p.resolution, GridResolution { rows: 10, cols: 10 });
        assert_eq!(p.path.speed_mps, 5.0);
        assert_eq!(p.normalize.min_confidence, 0.25);
        assert!(p.normalize.simulate_gps);
    }

    #[test]
    fn test_pipeline_rejects_bad_values() {
        let mut c = Config::default();
        c.grid_cols = 0;
        assert_eq!(c.pipeline(), Err(ConfigError::Resolution { rows: 10, cols: 0 }));

        let mut c = Config::default();
        c.field_max_lat = c.field_min_lat;
        assert!(matches!(c.pipeline(), Err(ConfigError::Bounds(_))));

        let mut c = Config::default();
        c.drone_speed_mps = 0.0;
        assert!(matches!(c.pipeline(), Err(ConfigError::NotPositive { .. })));

        let mut c = Config::default();
        c.treatment_rate_per_ha = -1.0;
        assert!(matches!(c.pipeline(), Err(ConfigError::Negative { key: "TREATMENT_RATE_PER_HA", .. })));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile("SIMULATE_GPS=false\nREPORT_DIR=/tmp/reports\nMISSION_FILE=\n");
        let config = load(tmp.as_path()).unwrap();
        assert!(!config.simulate_gps);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
        assert!(config.mission_file.is_none());
    }

    fn tempfile(content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cropscan_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.conf");
        std::fs::write(&path, content).unwrap();
        path
    }
}
