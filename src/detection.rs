//! Detection payloads from the remote endpoint.
//!
//! The server reports box geometry in several shapes. `WireDetection` accepts
//! all of them; `Detection` carries the normalized `Geometry` variant and is
//! what the rest of the crate works with.

use serde::{Deserialize, Serialize};

/// One detection as it arrives on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDetection {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Body of a `/detect_frame` response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Option<Vec<WireDetection>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetectResponse {
    pub fn ok(detections: Vec<WireDetection>) -> Self {
        Self {
            detections: Some(detections),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            detections: None,
            error: Some(error.into()),
        }
    }

    /// Normalized detections, in arrival order.
    pub fn into_detections(self) -> Vec<Detection> {
        self.detections
            .unwrap_or_default()
            .into_iter()
            .map(Detection::from)
            .collect()
    }
}

/// Box geometry, resolved once at ingestion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    /// Explicit corner coordinates.
    Corners { x1: f64, y1: f64, x2: f64, y2: f64 },
    /// Width/height pair; origin defaults to 0 when absent.
    Sized {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// No usable geometry. Drawn as a centered default box.
    Unplaced,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub model: Option<String>,
    pub geometry: Geometry,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, geometry: Geometry) -> Self {
        Self {
            label: label.into(),
            confidence,
            model: None,
            geometry,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl From<WireDetection> for Detection {
    fn from(wire: WireDetection) -> Self {
        let geometry = match (wire.x1, wire.y1, wire.x2, wire.y2, wire.width, wire.height) {
            (Some(x1), Some(y1), Some(x2), Some(y2), _, _) => Geometry::Corners { x1, y1, x2, y2 },
            (x1, y1, _, _, Some(width), Some(height)) => Geometry::Sized {
                x: x1.unwrap_or(0.0),
                y: y1.unwrap_or(0.0),
                width,
                height,
            },
            _ => Geometry::Unplaced,
        };
        Self {
            label: wire.label,
            confidence: wire.confidence,
            model: wire.model.filter(|model| !model.is_empty()),
            geometry,
        }
    }
}

/// Detections worth drawing: `confidence >= threshold`, highest confidence
/// first, at most `limit` of them. Ties keep arrival order.
pub fn significant(detections: &[Detection], threshold: f64, limit: usize) -> Vec<Detection> {
    let mut kept: Vec<Detection> = detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .cloned()
        .collect();
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept.truncate(limit);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Detection {
        serde_json::from_str::<WireDetection>(json).unwrap().into()
    }

    #[test]
    fn corners_take_priority_over_size() {
        let d = parse(r#"{"label":"car","confidence":0.8,"x1":1,"y1":2,"x2":11,"y2":22,"width":99,"height":99}"#);
        assert_eq!(
            d.geometry,
            Geometry::Corners {
                x1: 1.0,
                y1: 2.0,
                x2: 11.0,
                y2: 22.0
            }
        );
    }

    #[test]
    fn size_without_origin_defaults_to_zero() {
        let d = parse(r#"{"label":"dog","confidence":0.7,"width":30,"height":40}"#);
        assert_eq!(
            d.geometry,
            Geometry::Sized {
                x: 0.0,
                y: 0.0,
                width: 30.0,
                height: 40.0
            }
        );
    }

    #[test]
    fn partial_corners_with_size_use_given_origin() {
        let d = parse(r#"{"label":"dog","confidence":0.7,"x1":5,"y1":6,"x2":50,"width":30,"height":40}"#);
        assert_eq!(
            d.geometry,
            Geometry::Sized {
                x: 5.0,
                y: 6.0,
                width: 30.0,
                height: 40.0
            }
        );
    }

    #[test]
    fn missing_geometry_is_unplaced() {
        let d = parse(r#"{"label":"stone","confidence":0.9,"model":"custom","x1":4}"#);
        assert_eq!(d.geometry, Geometry::Unplaced);
        assert_eq!(d.model.as_deref(), Some("custom"));
    }

    #[test]
    fn response_tolerates_null_detections() {
        let resp: DetectResponse = serde_json::from_str(r#"{"detections":null}"#).unwrap();
        assert!(resp.into_detections().is_empty());

        let resp: DetectResponse = serde_json::from_str(r#"{"error":"model not loaded"}"#).unwrap();
        assert_eq!(resp.error.as_deref(), Some("model not loaded"));
    }

    #[test]
    fn significant_filters_sorts_and_caps() {
        let confidences = [0.3, 0.95, 0.41, 0.4, 0.99, 0.6, 0.39, 0.7, 0.8];
        let detections: Vec<Detection> = confidences
            .iter()
            .enumerate()
            .map(|(i, c)| Detection::new(format!("obj{i}"), *c, Geometry::Unplaced))
            .collect();

        let kept = significant(&detections, 0.4, 5);
        let got: Vec<f64> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(got, vec![0.99, 0.95, 0.8, 0.7, 0.6]);
    }

    #[test]
    fn significant_keeps_threshold_boundary_and_tie_order() {
        let detections = vec![
            Detection::new("first", 0.4, Geometry::Unplaced),
            Detection::new("second", 0.4, Geometry::Unplaced),
            Detection::new("low", 0.399, Geometry::Unplaced),
        ];
        let kept = significant(&detections, 0.4, 5);
        let labels: Vec<&str> = kept.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["first", "second"]);
    }
}
