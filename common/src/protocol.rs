//! Wire types of the external detection service.
//!
//! The service has emitted two item shapes over time: flat detections and
//! whole frame events carrying a nested `detections` array. Items are kept
//! as raw JSON here and parsed one by one during normalization, so a single
//! malformed item never rejects the whole batch.

use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::GeoPoint;

/// Response body of `GET /detections`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionsResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub detections: Vec<serde_json::Value>,
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of `GET /status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub video_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// One processed video frame with every detection found in it.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameEvent {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub frame_id: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub detections: Vec<serde_json::Value>,
}

/// A single detection as sent by the service. Every field is optional;
/// normalization decides what is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetection {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, alias = "frameId", deserialize_with = "lenient_u64")]
    pub frame_id: u64,
    #[serde(default, alias = "class_name", alias = "diseaseLabel", alias = "label")]
    pub disease: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    #[serde(default, alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(default, alias = "lon", alias = "longitude")]
    pub lng: Option<f64>,
}

impl RawDetection {
    /// Explicit position, either nested or as top-level `lat`/`lng`.
    pub fn position(&self) -> Option<GeoPoint> {
        self.position.or(match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        })
    }
}

/// A wire item is a frame event if it carries a `detections` array.
#[derive(Debug, Clone)]
pub enum WireItem {
    Frame(FrameEvent),
    Single(RawDetection),
}

impl WireItem {
    pub fn parse(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("detections").is_some() {
            serde_json::from_value(value.clone()).map(WireItem::Frame)
        } else {
            serde_json::from_value(value.clone()).map(WireItem::Single)
        }
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A number, or a string holding one. Anything else reads as absent.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_frame_event() {
        let v = json!({
            "frame_id": 12,
            "timestamp": "2026-01-14T15:41:36",
            "image_size": {"width": 640, "height": 480},
            "detection_count": 1,
            "detections": [{"class_name": "leaf_blight", "confidence": 0.8}]
        });
        match WireItem::parse(&v).unwrap() {
            WireItem::Frame(f) => {
                assert_eq!(f.frame_id, 12);
                assert_eq!(f.detections.len(), 1);
            }
            WireItem::Single(_) => panic!("expected frame event"),
        }
    }

    #[test]
    fn test_parse_flat_detection_aliases() {
        let v = json!({"id": 7, "frameId": "3", "label": "rust", "lat": 11.0, "lon": 77.0});
        match WireItem::parse(&v).unwrap() {
            WireItem::Single(d) => {
                assert_eq!(d.id.as_deref(), Some("7"));
                assert_eq!(d.frame_id, 3);
                assert_eq!(d.disease.as_deref(), Some("rust"));
                assert_eq!(d.position(), Some(GeoPoint::new(11.0, 77.0)));
            }
            WireItem::Frame(_) => panic!("expected flat detection"),
        }
    }

    #[test]
    fn test_response_defaults() {
        let r: DetectionsResponse = serde_json::from_str("{}").unwrap();
        assert!(r.session_id.is_none());
        assert!(r.detections.is_empty());
    }

    #[test]
    fn test_confidence_as_string() {
        let v = json!({"disease": "rust", "confidence": " 0.9 "});
        match WireItem::parse(&v).unwrap() {
            WireItem::Single(d) => assert_eq!(d.confidence, Some(0.9)),
            WireItem::Frame(_) => panic!("expected flat detection"),
        }

        let d: RawDetection = serde_json::from_value(json!({"confidence": "high"})).unwrap();
        assert!(d.confidence.is_none());
    }

    #[test]
    fn test_status_response() {
        let s: StatusResponse = serde_json::from_value(json!({
            "running": true,
            "session_id": "20260114_154136",
            "video_name": "field_a.mp4",
            "start_time": "2026-01-14T15:41:36"
        }))
        .unwrap();
        assert!(s.running);
        assert_eq!(s.session_id.as_deref(), Some("20260114_154136"));
        assert_eq!(s.video_name.as_deref(), Some("field_a.mp4"));

        let idle: StatusResponse = serde_json::from_str(r#"{"running": false}"#).unwrap();
        assert!(!idle.running);
        assert!(idle.session_id.is_none());
    }
}
