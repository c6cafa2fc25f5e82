//! Geographic primitives: points, rectangular field bounds and
//! great-circle distance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used for all distance computations (metres).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const SQ_METRES_PER_HECTARE: f64 = 10_000.0;

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Haversine distance between two positions, in metres.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("field bounds contain a non-finite coordinate")]
    NotFinite,
    #[error("latitude range [{min}, {max}] is empty or inverted")]
    EmptyLatitude { min: f64, max: f64 },
    #[error("longitude range [{min}, {max}] is empty or inverted")]
    EmptyLongitude { min: f64, max: f64 },
    #[error("field bounds outside the valid coordinate range")]
    OutOfRange,
}

/// Rectangular extent of the field under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl FieldBounds {
    /// Build validated bounds.
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Result<Self, BoundsError> {
        let bounds = Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check the invariants `new` enforces. Bounds deserialized from a file
    /// bypass `new`, so callers re-validate them here.
    pub fn validate(&self) -> Result<(), BoundsError> {
        let coords = [self.min_lat, self.max_lat, self.min_lng, self.max_lng];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(BoundsError::NotFinite);
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 || self.min_lng < -180.0 || self.max_lng > 180.0 {
            return Err(BoundsError::OutOfRange);
        }
        if self.min_lat >= self.max_lat {
            return Err(BoundsError::EmptyLatitude {
                min: self.min_lat,
                max: self.max_lat,
            });
        }
        if self.min_lng >= self.max_lng {
            return Err(BoundsError::EmptyLongitude {
                min: self.min_lng,
                max: self.max_lng,
            });
        }
        Ok(())
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Ground area of the rectangle, measured along the centre lines.
    pub fn area_hectares(&self) -> f64 {
        let mid = self.center();
        let height = haversine_distance(self.min_lat, mid.lng, self.max_lat, mid.lng);
        let width = haversine_distance(mid.lat, self.min_lng, mid.lat, self.max_lng);
        height * width / SQ_METRES_PER_HECTARE
    }
}
