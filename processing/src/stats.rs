//! Grid statistics – summary counts over a built grid.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStats {
    pub total_cells: usize,
    pub infected_count: usize,
    pub infected_percentage: f64,
    /// Share of the field exempt from treatment compared with blanket
    /// spraying. Pure area fraction, not dose weighted.
    pub chemical_savings: f64,
}

impl GridStats {
    /// Fraction of cells infected, in `[0, 1]`.
    pub fn infected_fraction(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            self.infected_count as f64 / self.total_cells as f64
        }
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn compute_stats(grid: &Grid) -> GridStats {
    let total_cells = grid.total_cells();
    if total_cells == 0 {
        return GridStats::default();
    }
    let infected_count = grid.infected_cells().count();
    let total = total_cells as f64;

    GridStats {
        total_cells,
        infected_count,
        infected_percentage: round1(infected_count as f64 / total * 100.0),
        chemical_savings: round1((total_cells - infected_count) as f64 / total * 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::build_grid;
    use cropscan_common::config::GridResolution;
    use cropscan_common::detection::Detection;
    use cropscan_common::geo::{FieldBounds, GeoPoint};

    fn det(label: &str, lat: f64, lng: f64) -> Detection {
        Detection {
            id: format!("{label}-{lat}-{lng}"),
            frame_id: 0,
            disease_label: label.to_string(),
            confidence: 0.8,
            position: GeoPoint::new(lat, lng),
        }
    }

    #[test]
    fn test_empty_grid_stats() {
        let b = FieldBounds::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let g = build_grid(&[], &b, GridResolution { rows: 10, cols: 10 });
        let s = compute_stats(&g);
        assert_eq!(s.total_cells, 100);
        assert_eq!(s.infected_count, 0);
        assert_eq!(s.infected_percentage, 0.0);
        assert_eq!(s.chemical_savings, 100.0);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let b = FieldBounds::new(0.0, 3.0, 0.0, 3.0).unwrap();
        let dets = vec![det("rust", 0.5, 0.5), det("rust", 1.5, 1.5), det("healthy", 2.5, 2.5)];
        let g = build_grid(&dets, &b, GridResolution { rows: 3, cols: 3 });
        let s = compute_stats(&g);
        assert_eq!(s.infected_count, 2);
        assert_eq!(s.infected_percentage, 22.2);
        assert_eq!(s.chemical_savings, 77.8);
        assert!((s.infected_percentage + s.chemical_savings - 100.0).abs() < 0.11);
        assert!((s.infected_fraction() - 2.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_cells_vector() {
        let b = FieldBounds::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let mut g = build_grid(&[], &b, GridResolution { rows: 1, cols: 1 });
        g.cells.clear();
        assert_eq!(compute_stats(&g), GridStats::default());
    }
}
