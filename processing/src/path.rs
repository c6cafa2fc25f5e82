//! Coverage path generator – orders infected cells into a single spray
//! route using a boustrophedon (serpentine) sweep.
//!
//! Rows are visited in ascending order. Even rows are swept with ascending
//! columns, odd rows with descending columns, so the drone never flies back
//! across the field between two adjacent rows. Distances are great-circle
//! (haversine) metres between consecutive cell centroids.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cropscan_common::config::PathParams;

use crate::grid::{Grid, GridCell};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub row: usize,
    pub col: usize,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprayPath {
    pub path_exists: bool,
    pub waypoints: Vec<Waypoint>,
    /// Metres.
    pub total_distance: f64,
    /// Seconds.
    pub estimated_time: f64,
}

impl SprayPath {
    pub fn empty() -> Self {
        Self {
            path_exists: false,
            waypoints: Vec::new(),
            total_distance: 0.0,
            estimated_time: 0.0,
        }
    }
}

/// Sweep order key: row first, then column in the row's direction.
fn sweep_key(cell: &GridCell) -> (usize, isize) {
    let col = cell.col as isize;
    (cell.row, if cell.row % 2 == 0 { col } else { -col })
}

pub fn generate_path(grid: &Grid, params: &PathParams) -> SprayPath {
    let mut targets: Vec<&GridCell> = grid.infected_cells().collect();
    if targets.is_empty() {
        return SprayPath::empty();
    }
    targets.sort_by_key(|c| sweep_key(c));

    let waypoints: Vec<Waypoint> = targets
        .iter()
        .map(|c| {
            let centre = c.centroid();
            Waypoint {
                row: c.row,
                col: c.col,
                lat: centre.lat,
                lng: centre.lng,
            }
        })
        .collect();

    let total_distance = route_distance_m(&waypoints);
    let estimated_time = estimate_time_secs(total_distance, waypoints.len(), params);

    debug!(
        "Spray path: {} waypoint(s), {:.1} m, {:.1} s",
        waypoints.len(),
        total_distance,
        estimated_time
    );

    SprayPath {
        path_exists: true,
        waypoints,
        total_distance,
        estimated_time,
    }
}

fn route_distance_m(waypoints: &[Waypoint]) -> f64 {
    waypoints
        .windows(2)
        .map(|w| cropscan_common::geo::haversine_distance(w[0].lat, w[0].lng, w[1].lat, w[1].lng))
        .sum()
}

fn estimate_time_secs(distance_m: f64, waypoint_count: usize, params: &PathParams) -> f64 {
    let travel = if params.speed_mps > 0.0 {
        distance_m / params.speed_mps
    } else {
        0.0
    };
    travel + params.waypoint_overhead_secs * waypoint_count as f64
}
