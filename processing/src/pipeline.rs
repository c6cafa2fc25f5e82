//! One pass of the analysis pipeline over a normalized detection batch:
//! grid, then statistics, then the economic estimate.
//!
//! The spray path is not part of a pass; it is generated on request from
//! the grid a pass produced.

use serde::Serialize;
use tracing::debug;

use cropscan_common::config::PipelineConfig;
use cropscan_common::detection::Detection;

use crate::economics::{self, EconomicImpact};
use crate::grid::{self, Grid};
use crate::stats::{self, GridStats};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub grid: Grid,
    pub stats: GridStats,
    pub economics: EconomicImpact,
}

pub fn run(detections: &[Detection], config: &PipelineConfig) -> PipelineOutput {
    let grid = grid::build_grid(detections, &config.bounds, config.resolution);
    let stats = stats::compute_stats(&grid);
    let economics = economics::estimate(&stats, &config.bounds, &config.rates);

    debug!(
        "Pipeline: {} detection(s) -> {}/{} infected cell(s), savings {:.0} {}",
        detections.len(),
        stats.infected_count,
        stats.total_cells,
        economics.expected_savings,
        config.rates.currency
    );

    PipelineOutput {
        grid,
        stats,
        economics,
    }
}
