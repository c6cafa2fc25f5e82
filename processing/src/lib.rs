//! CropScan processing – turns a batch of disease detections into a field
//! grid, treatment statistics, a spray route, an economic estimate and a
//! mission report.

pub mod client;
pub mod economics;
pub mod export;
pub mod grid;
pub mod mission;
pub mod path;
pub mod pipeline;
pub mod report;
pub mod stats;
