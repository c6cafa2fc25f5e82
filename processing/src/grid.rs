//! Field grid builder – partitions the field into fixed-resolution cells
//! and buckets detections into them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cropscan_common::config::GridResolution;
use cropscan_common::detection::{is_healthy_label, Detection};
use cropscan_common::geo::{FieldBounds, GeoPoint};

/// One cell of the field partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub bounds: FieldBounds,
    pub detection_count: usize,
    pub infected: bool,
    /// Most frequent label in the cell; `None` for empty cells.
    pub dominant_diagnosis: Option<String>,
}

impl GridCell {
    pub fn centroid(&self) -> GeoPoint {
        self.bounds.center()
    }
}

/// Row-major collection of cells covering the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub cell_size_lat: f64,
    pub cell_size_lng: f64,
    pub bounds: FieldBounds,
    pub cells: Vec<GridCell>,
}

impl Grid {
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    pub fn infected_cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter().filter(|c| c.infected)
    }

    /// `(row, col)` of the cell containing `point`, or `None` when the point
    /// lies outside the field. Points on the far edges fall into the last
    /// row / column.
    pub fn locate(&self, point: &GeoPoint) -> Option<(usize, usize)> {
        if !self.bounds.contains(point) {
            return None;
        }
        let row = ((point.lat - self.bounds.min_lat) / self.cell_size_lat).floor() as usize;
        let col = ((point.lng - self.bounds.min_lng) / self.cell_size_lng).floor() as usize;
        Some((row.min(self.rows - 1), col.min(self.cols - 1)))
    }
}

/// Per-cell label tally that remembers first-seen order for tie breaking.
#[derive(Default)]
struct LabelTally {
    counts: Vec<(String, usize)>,
}

impl LabelTally {
    fn add(&mut self, label: &str) {
        match self.counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((label.to_string(), 1)),
        }
    }

    fn dominant(&self) -> Option<&str> {
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.counts {
            // strict `>` keeps the earliest label on ties
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(l, _)| l.as_str())
    }
}

/// Build a fully populated grid from a detection batch.
///
/// `resolution` must be at least 1x1; `Config::pipeline` guarantees that.
pub fn build_grid(detections: &[Detection], bounds: &FieldBounds, resolution: GridResolution) -> Grid {
    let rows = resolution.rows.max(1);
    let cols = resolution.cols.max(1);
    let cell_size_lat = bounds.lat_span() / rows as f64;
    let cell_size_lng = bounds.lng_span() / cols as f64;

    let mut grid = Grid {
        rows,
        cols,
        cell_size_lat,
        cell_size_lng,
        bounds: *bounds,
        cells: Vec::with_capacity(rows * cols),
    };

    for row in 0..rows {
        for col in 0..cols {
            let min_lat = bounds.min_lat + row as f64 * cell_size_lat;
            let min_lng = bounds.min_lng + col as f64 * cell_size_lng;
            grid.cells.push(GridCell {
                row,
                col,
                bounds: FieldBounds {
                    min_lat,
                    max_lat: min_lat + cell_size_lat,
                    min_lng,
                    max_lng: min_lng + cell_size_lng,
                },
                detection_count: 0,
                infected: false,
                dominant_diagnosis: None,
            });
        }
    }

    let mut tallies: Vec<LabelTally> = (0..rows * cols).map(|_| LabelTally::default()).collect();
    let mut dropped = 0usize;

    for d in detections {
        let Some((row, col)) = grid.locate(&d.position) else {
            debug!("Detection {} at {:?} outside field, dropped", d.id, d.position);
            dropped += 1;
            continue;
        };
        let idx = row * cols + col;
        grid.cells[idx].detection_count += 1;
        tallies[idx].add(&d.disease_label);
    }

    for (cell, tally) in grid.cells.iter_mut().zip(&tallies) {
        cell.dominant_diagnosis = tally.dominant().map(str::to_string);
        cell.infected = cell.detection_count >= 1
            && cell
                .dominant_diagnosis
                .as_deref()
                .is_some_and(|l| !is_healthy_label(l));
    }

    debug!(
        "Built {}x{} grid from {} detection(s) ({} outside field)",
        rows,
        cols,
        detections.len(),
        dropped
    );
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> FieldBounds {
        FieldBounds::new(0.0, 3.0, 0.0, 3.0).unwrap()
    }

    fn det(id: &str, label: &str, lat: f64, lng: f64) -> Detection {
        Detection {
            id: id.to_string(),
            frame_id: 0,
            disease_label: label.to_string(),
            confidence: 0.9,
            position: GeoPoint::new(lat, lng),
        }
    }

    const RES: GridResolution = GridResolution { rows: 3, cols: 3 };

    #[test]
    fn test_empty_input_gives_empty_cells() {
        let g = build_grid(&[], &bounds(), RES);
        assert_eq!(g.total_cells(), 9);
        assert!(g.cells.iter().all(|c| c.detection_count == 0 && !c.infected));
        assert!(g.cells.iter().all(|c| c.dominant_diagnosis.is_none()));
    }

    #[test]
    fn test_bucketing_and_conservation() {
        let dets = vec![
            det("a", "rust", 0.5, 0.5),
            det("b", "rust", 1.5, 2.5),
            det("c", "blight", 2.9, 0.1),
            det("d", "rust", 3.0, 3.0),  // far corner -> last cell
            det("e", "rust", 3.5, 1.0),  // outside
            det("f", "rust", -0.1, 1.0), // outside
        ];
        let g = build_grid(&dets, &bounds(), RES);
        let inside = dets.iter().filter(|d| g.bounds.contains(&d.position)).count();
        let total: usize = g.cells.iter().map(|c| c.detection_count).sum();
        assert_eq!(total, inside);
        assert_eq!(total, 4);

        assert_eq!(g.cell(0, 0).unwrap().detection_count, 1);
        assert_eq!(g.cell(1, 2).unwrap().detection_count, 1);
        assert_eq!(g.cell(2, 0).unwrap().dominant_diagnosis.as_deref(), Some("blight"));
        assert_eq!(g.cell(2, 2).unwrap().detection_count, 1);
    }

    #[test]
    fn test_dominant_label_tie_breaks_first_seen() {
        let dets = vec![
            det("a", "mildew", 0.2, 0.2),
            det("b", "rust", 0.3, 0.3),
            det("c", "rust", 0.4, 0.4),
            det("d", "mildew", 0.5, 0.5),
        ];
        let g = build_grid(&dets, &bounds(), RES);
        assert_eq!(g.cell(0, 0).unwrap().dominant_diagnosis.as_deref(), Some("mildew"));

        let dets = vec![
            det("a", "mildew", 0.2, 0.2),
            det("b", "rust", 0.3, 0.3),
            det("c", "rust", 0.4, 0.4),
        ];
        let g = build_grid(&dets, &bounds(), RES);
        assert_eq!(g.cell(0, 0).unwrap().dominant_diagnosis.as_deref(), Some("rust"));
    }

    #[test]
    fn test_healthy_cells_not_infected() {
        let dets = vec![
            det("a", "healthy", 0.5, 0.5),
            det("b", "healthy", 0.6, 0.6),
            det("c", "rust", 0.7, 0.7),
            det("d", "Tomato___healthy", 1.5, 1.5),
        ];
        let g = build_grid(&dets, &bounds(), RES);
        let c00 = g.cell(0, 0).unwrap();
        assert_eq!(c00.detection_count, 3);
        assert!(!c00.infected);
        assert!(!g.cell(1, 1).unwrap().infected);
        assert_eq!(g.infected_cells().count(), 0);
    }

    #[test]
    fn test_cell_geometry() {
        let g = build_grid(&[], &bounds(), RES);
        let c = g.cell(1, 2).unwrap();
        assert_eq!(c.bounds.min_lat, 1.0);
        assert_eq!(c.bounds.min_lng, 2.0);
        assert_eq!(c.centroid(), GeoPoint::new(1.5, 2.5));
        assert!(g.cell(3, 0).is_none());
    }
}
