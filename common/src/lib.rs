//! Shared types for the CropScan crates: geography, detections,
//! configuration and the detection-service wire protocol.

pub mod config;
pub mod detection;
pub mod geo;
pub mod protocol;
