//! Report export – persists an aggregated mission report.
//!
//! Rendering (PDF, print views) is not done here; exporters hand the
//! canonical JSON document to whatever renders it downstream.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::report::MissionReport;

pub trait ReportExporter {
    /// Persist `report`, returning where it was written.
    fn export(&self, report: &MissionReport) -> Result<PathBuf>;
}

/// Writes `mission-report-{mission_id}-{timestamp}.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReportExporter for JsonFileExporter {
    fn export(&self, report: &MissionReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create report dir {}", self.dir.display()))?;

        let path = self.dir.join(report_file_name(report));
        let json = serde_json::to_string_pretty(report).context("Serialize mission report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Cannot write {}", path.display()))?;

        info!("Mission report written to {}", path.display());
        Ok(path)
    }
}

pub fn report_file_name(report: &MissionReport) -> String {
    let stamp = DateTime::parse_from_rfc3339(&report.generated_at)
        .map(|t| t.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_else(|_| sanitize(&report.generated_at));
    format!("mission-report-{}-{stamp}.json", sanitize(&report.metadata.mission_id))
}

/// Keep file names portable: anything but ASCII alphanumerics, `-` and `_`
/// becomes `_`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
