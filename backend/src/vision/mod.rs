//! Food image understanding
//!
//! Two stages: an object detector (a YOLO inference service) says where and
//! how many things are on the plate, then [`GeminiVisionEngine`] names the
//! dish and estimates portions using the detector output as hints.

use crate::llm::{InlineImage, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

mod engine;

pub use engine::GeminiVisionEngine;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("detector request failed: {0}")]
    Transport(String),

    #[error("detector returned {status}: {message}")]
    Detector { status: u16, message: String },

    #[error("could not parse vision output: {0}")]
    Parse(String),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl VisionError {
    pub fn is_transient(&self) -> bool {
        match self {
            VisionError::Transport(_) => true,
            VisionError::Detector { status, .. } => *status >= 500,
            VisionError::Parse(_) => false,
            VisionError::Llm(err) => err.is_transient(),
        }
    }
}

/// A single bounding box from the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
}

/// Detections merged per label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub label: String,
    pub count: u32,
    pub confidence: f32,
}

/// Merge raw detections by label, dropping low-confidence boxes
///
/// Labels are compared case-insensitively and returned lowercase. The
/// result is ordered by count, then label.
pub fn group_detections(detections: &[Detection], min_confidence: f32) -> Vec<ObjectDetection> {
    let mut grouped: Vec<ObjectDetection> = Vec::new();

    for detection in detections {
        let label = detection.label.trim().to_lowercase();
        if label.is_empty() || detection.confidence < min_confidence {
            continue;
        }
        match grouped.iter_mut().find(|g| g.label == label) {
            Some(existing) => {
                existing.count += 1;
                existing.confidence = existing.confidence.max(detection.confidence);
            }
            None => grouped.push(ObjectDetection {
                label,
                count: 1,
                confidence: detection.confidence,
            }),
        }
    }

    grouped.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    grouped
}

/// Object detection over a meal photo
#[async_trait]
pub trait FoodDetector: Send + Sync {
    async fn detect(&self, image: &InlineImage) -> Result<Vec<Detection>, VisionError>;
}

/// Used when no detector service is configured
pub struct NoopDetector;

#[async_trait]
impl FoodDetector for NoopDetector {
    async fn detect(&self, _image: &InlineImage) -> Result<Vec<Detection>, VisionError> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Client for a YOLO inference service
///
/// POSTs `{image: base64, mime_type}` and expects
/// `{detections: [{label, confidence, bbox}]}` back.
pub struct HttpFoodDetector {
    http: Client,
    url: String,
}

impl HttpFoodDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FoodDetector for HttpFoodDetector {
    #[instrument(skip(self, image), fields(bytes = image.data.len()))]
    async fn detect(&self, image: &InlineImage) -> Result<Vec<Detection>, VisionError> {
        let body = DetectRequest {
            image: image.to_base64(),
            mime_type: &image.mime_type,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, "Food detector error");
            return Err(VisionError::Detector {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;
        debug!(count = parsed.detections.len(), "Detector returned boxes");
        Ok(parsed.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn det(label: &str, confidence: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox: None,
        }
    }

    #[test]
    fn test_group_detections_counts_and_filters() {
        let detections = vec![
            det("banana", 0.9),
            det("Banana", 0.95),
            det("apple", 0.6),
            det("banana", 0.4),
            det("cup", 0.1),
        ];

        let grouped = group_detections(&detections, 0.25);
        assert_eq!(
            grouped,
            vec![
                ObjectDetection { label: "banana".into(), count: 3, confidence: 0.95 },
                ObjectDetection { label: "apple".into(), count: 1, confidence: 0.6 },
            ]
        );
    }

    #[test]
    fn test_group_detections_empty() {
        assert!(group_detections(&[], 0.25).is_empty());
        assert!(group_detections(&[det("  ", 0.9)], 0.25).is_empty());
    }

    #[tokio::test]
    async fn test_http_detector_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .and(body_partial_json(json!({"mime_type": "image/jpeg", "image": "AQID"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "detections": [
                    {"label": "banana", "confidence": 0.9, "bbox": [0, 0, 10, 10]},
                    {"label": "banana", "confidence": 0.8}
                ]
            })))
            .mount(&server)
            .await;

        let detector =
            HttpFoodDetector::new(format!("{}/detect", server.uri()), Duration::from_secs(5)).unwrap();
        let image = InlineImage::new("image/jpeg", vec![1, 2, 3]);
        let detections = detector.detect(&image).await.unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bbox, Some([0.0, 0.0, 10.0, 10.0]));
    }

    #[tokio::test]
    async fn test_http_detector_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let detector = HttpFoodDetector::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = detector
            .detect(&InlineImage::new("image/png", vec![0]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("model not loaded"));
    }
}
