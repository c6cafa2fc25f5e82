//! Mission profile – static description of one survey mission.
//!
//! Each mission may ship a `mission.toml` next to its data:
//!
//! ```toml
//! [mission]
//! mission_id = "M-2026-014"
//! field_name = "North paddy"
//! operator = "R. Kumar"
//! drone_id = "AGR-07"
//! crop_type = "rice"
//!
//! [field]
//! min_lat = 11.0000
//! max_lat = 11.0100
//! min_lng = 77.0000
//! max_lng = 77.0100
//! grid_rows = 12
//! grid_cols = 12
//!
//! [economics]
//! loss_rate_per_ha = 30000.0
//! treatment_rate_per_ha = 2500.0
//! currency = "INR"
//! ```
//!
//! Every section is optional; values present override `cropscan.conf`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use cropscan_common::config::{Config, ConfigError, GridResolution, PipelineConfig};
use cropscan_common::geo::FieldBounds;

use crate::report::MissionMetadata;

/// Top-level profile structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionProfile {
    #[serde(default)]
    pub mission: MissionSection,
    #[serde(default)]
    pub field: Option<FieldSection>,
    #[serde(default)]
    pub economics: Option<EconomicsSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionSection {
    pub mission_id: Option<String>,
    pub field_name: Option<String>,
    pub operator: Option<String>,
    pub drone_id: Option<String>,
    pub crop_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSection {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    #[serde(default)]
    pub grid_rows: Option<usize>,
    #[serde(default)]
    pub grid_cols: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EconomicsSection {
    pub loss_rate_per_ha: Option<f64>,
    pub treatment_rate_per_ha: Option<f64>,
    pub chemical_dose_l_per_ha: Option<f64>,
    pub currency: Option<String>,
}

impl MissionProfile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid mission profile")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read mission profile: {}", path.display()))?;
        let profile = Self::parse(&text)
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        info!("Loaded mission profile from {}", path.display());
        Ok(profile)
    }

    pub fn metadata(&self) -> MissionMetadata {
        let d = MissionMetadata::default();
        let m = &self.mission;
        MissionMetadata {
            mission_id: m.mission_id.clone().unwrap_or(d.mission_id),
            field_name: m.field_name.clone().unwrap_or(d.field_name),
            operator: m.operator.clone().unwrap_or(d.operator),
            drone_id: m.drone_id.clone().unwrap_or(d.drone_id),
            crop_type: m.crop_type.clone().unwrap_or(d.crop_type),
            session_id: None,
            started_at: None,
        }
    }

    /// Overlay the profile onto a pipeline configuration, re-validating
    /// whatever it changes.
    pub fn apply(&self, pipeline: &mut PipelineConfig) -> Result<(), ConfigError> {
        if let Some(f) = &self.field {
            pipeline.bounds = FieldBounds::new(f.min_lat, f.max_lat, f.min_lng, f.max_lng)?;
            let rows = f.grid_rows.unwrap_or(pipeline.resolution.rows);
            let cols = f.grid_cols.unwrap_or(pipeline.resolution.cols);
            if rows == 0 || cols == 0 {
                return Err(ConfigError::Resolution { rows, cols });
            }
            pipeline.resolution = GridResolution { rows, cols };
        }

        if let Some(e) = &self.economics {
            let rates = &mut pipeline.rates;
            for (key, value, slot) in [
                ("loss_rate_per_ha", e.loss_rate_per_ha, &mut rates.loss_rate_per_ha),
                ("treatment_rate_per_ha", e.treatment_rate_per_ha, &mut rates.treatment_rate_per_ha),
                ("chemical_dose_l_per_ha", e.chemical_dose_l_per_ha, &mut rates.chemical_dose_l_per_ha),
            ] {
                if let Some(v) = value {
                    if !(v >= 0.0) {
                        return Err(ConfigError::Negative { key, value: v });
                    }
                    *slot = v;
                }
            }
            if let Some(c) = &e.currency {
                rates.currency = c.clone();
            }
        }
        Ok(())
    }
}

/// Resolve the pipeline configuration and mission metadata for a run:
/// `cropscan.conf` values, overlaid with `MISSION_FILE` when one is set.
pub fn resolve(config: &Config) -> Result<(PipelineConfig, MissionMetadata)> {
    let mut pipeline = config.pipeline().context("Invalid pipeline configuration")?;

    let Some(path) = &config.mission_file else {
        return Ok((pipeline, MissionMetadata::default()));
    };

    let profile = MissionProfile::load(path)?;
    profile
        .apply(&mut pipeline)
        .with_context(|| format!("Invalid mission profile {}", path.display()))?;
    Ok((pipeline, profile.metadata()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[mission]
mission_id = "M-7"
field_name = "North paddy"
drone_id = "AGR-07"

[field]
min_lat = 12.0
max_lat = 12.02
min_lng = 78.0
max_lng = 78.02
grid_rows = 4

[economics]
treatment_rate_per_ha = 2500.0
currency = "USD"
"#;

    #[test]
    fn test_parse_and_apply() {
        let profile = MissionProfile::parse(FULL).unwrap();
        let meta = profile.metadata();
        assert_eq!(meta.mission_id, "M-7");
        assert_eq!(meta.drone_id, "AGR-07");
        assert_eq!(meta.operator, "N/A");

        let mut pipeline = Config::default().pipeline().unwrap();
        profile.apply(&mut pipeline).unwrap();
        assert_eq!(pipeline.bounds.min_lat, 12.0);
        assert_eq!(pipeline.resolution, GridResolution { rows: 4, cols: 10 });
        assert_eq!(pipeline.rates.treatment_rate_per_ha, 2500.0);
        assert_eq!(pipeline.rates.loss_rate_per_ha, 25_000.0);
        assert_eq!(pipeline.rates.currency, "USD");
    }

    #[test]
    fn test_empty_profile_changes_nothing() {
        let profile = MissionProfile::parse("").unwrap();
        let before = Config::default().pipeline().unwrap();
        let mut after = before.clone();
        profile.apply(&mut after).unwrap();
        assert_eq!(before, after);
        assert_eq!(profile.metadata(), MissionMetadata::default());
    }

    #[test]
    fn test_invalid_profile_values() {
        let mut pipeline = Config::default().pipeline().unwrap();
        let bad_bounds = MissionProfile::parse(
            "[field]\nmin_lat = 1.0\nmax_lat = 0.5\nmin_lng = 0.0\nmax_lng = 1.0\n",
        )
        .unwrap();
        assert!(matches!(bad_bounds.apply(&mut pipeline), Err(ConfigError::Bounds(_))));

        let bad_rate = MissionProfile::parse("[economics]\nloss_rate_per_ha = -5.0\n").unwrap();
        assert!(matches!(bad_rate.apply(&mut pipeline), Err(ConfigError::Negative { .. })));

        assert!(MissionProfile::parse("[field]\nmin_lat = \"x\"").is_err());
    }

    #[test]
    fn test_resolve_without_mission_file() {
        let (pipeline, meta) = resolve(&Config::default()).unwrap();
        assert_eq!(pipeline.resolution.total_cells(), 100);
        assert_eq!(meta, MissionMetadata::default());
    }
}
