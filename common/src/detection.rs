//! Detection model and normalization of raw wire items.
//!
//! Every `Detection` leaving this module has a label, a confidence in
//! `[0, 1]` and a position. Items that cannot satisfy that are dropped with
//! a warning rather than failing the batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::{FieldBounds, GeoPoint};
use crate::protocol::{RawDetection, WireItem};

/// A single observed disease instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub frame_id: u64,
    pub disease_label: String,
    pub confidence: f64,
    pub position: GeoPoint,
}

impl std::fmt::Display for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Detection({}, frame {}, {}, {:.4}, {:.6},{:.6})",
            self.id, self.frame_id, self.disease_label, self.confidence, self.position.lat, self.position.lng
        )
    }
}

/// `healthy`, `Healthy`, `Tomato___healthy`, `leaf healthy`, ...
pub fn is_healthy_label(label: &str) -> bool {
    let l = label.trim().to_ascii_lowercase();
    l == "healthy" || l.ends_with("_healthy") || l.ends_with(" healthy")
}

/// Knobs for turning wire items into detections.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    /// Detections below this confidence are discarded.
    pub min_confidence: f64,
    /// Assign a seeded synthetic position to detections without one.
    pub simulate_gps: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            simulate_gps: true,
        }
    }
}

/// Deterministic stand-in position for a detection that arrived without GPS.
///
/// The MD5 digest of the id is split into two 64-bit fractions which are
/// mapped into the field rectangle, so the same id always lands on the same
/// spot for the same bounds.
pub fn simulated_position(id: &str, bounds: &FieldBounds) -> GeoPoint {
    let digest = md5::compute(id.as_bytes()).0;
    let mut hi = [0u8; 8];
    let mut lo = [0u8; 8];
    hi.copy_from_slice(&digest[..8]);
    lo.copy_from_slice(&digest[8..]);

    let fy = u64::from_le_bytes(hi) as f64 / u64::MAX as f64;
    let fx = u64::from_le_bytes(lo) as f64 / u64::MAX as f64;

    GeoPoint::new(
        bounds.min_lat + fy * bounds.lat_span(),
        bounds.min_lng + fx * bounds.lng_span(),
    )
}

/// Flatten and normalize a batch of wire items, preserving order.
pub fn normalize_batch(
    items: &[serde_json::Value],
    bounds: &FieldBounds,
    opts: &NormalizeOptions,
) -> Vec<Detection> {
    let mut out = Vec::with_capacity(items.len());

    for (i, value) in items.iter().enumerate() {
        match WireItem::parse(value) {
            Ok(WireItem::Single(raw)) => {
                let fallback_id = format!("{}-{}", raw.frame_id, i);
                if let Some(d) = normalize_one(raw, fallback_id, bounds, opts) {
                    out.push(d);
                }
            }
            Ok(WireItem::Frame(frame)) => {
                for (j, inner) in frame.detections.iter().enumerate() {
                    let mut raw: RawDetection = match serde_json::from_value(inner.clone()) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("Dropping malformed detection in frame {}: {e}", frame.frame_id);
                            continue;
                        }
                    };
                    raw.frame_id = frame.frame_id;
                    let fallback_id = format!("{}-{}-{}", frame.frame_id, i, j);
                    if let Some(d) = normalize_one(raw, fallback_id, bounds, opts) {
                        out.push(d);
                    }
                }
            }
            Err(e) => warn!("Dropping malformed detection item #{i}: {e}"),
        }
    }

    debug!("Normalized {} wire item(s) into {} detection(s)", items.len(), out.len());
    out
}

fn normalize_one(
    raw: RawDetection,
    fallback_id: String,
    bounds: &FieldBounds,
    opts: &NormalizeOptions,
) -> Option<Detection> {
    let id = raw.id.clone().unwrap_or(fallback_id);

    let label = match raw.disease.as_deref().map(str::trim) {
        Some(l) if !l.is_empty() => l.to_string(),
        _ => {
            warn!("Dropping detection {id}: missing disease label");
            return None;
        }
    };

    let confidence = match raw.confidence.filter(|c| c.is_finite()) {
        Some(c) => c.clamp(0.0, 1.0),
        None => {
            warn!("Dropping detection {id}: missing or non-numeric confidence");
            return None;
        }
    };
    if confidence < opts.min_confidence {
        debug!("Dropping detection {id}: confidence {confidence:.3} below threshold");
        return None;
    }

    let position = match raw.position() {
        Some(p) if p.lat.is_finite() && p.lng.is_finite() => p,
        _ if opts.simulate_gps => simulated_position(&id, bounds),
        _ => {
            warn!("Dropping detection {id}: no position and GPS simulation disabled");
            return None;
        }
    };

    Some(Detection {
        id,
        frame_id: raw.frame_id,
        disease_label: label,
        confidence: (confidence * 10000.0).round() / 10000.0,
        position,
    })
}
