use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::detect::backend::{DetectionCapability, SensorBackend, VisionBackend};
use crate::detect::result::{Classification, Detection};
use crate::frame::Frame;

/// Scripted vision backend for dry runs and tests.
///
/// Returns the same detections/classifications for every crop and records
/// the size of each crop it was handed.
pub struct StubBackend {
    name: String,
    detections: Vec<Detection>,
    classifications: Vec<Classification>,
    failure: Option<String>,
    calls: AtomicUsize,
    crops: Mutex<Vec<(u32, u32)>>,
}

impl StubBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detections: Vec::new(),
            classifications: Vec::new(),
            failure: None,
            calls: AtomicUsize::new(0),
            crops: Mutex::new(Vec::new()),
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    pub fn with_classifications(mut self, classifications: Vec<Classification>) -> Self {
        self.classifications = classifications;
        self
    }

    /// Make every call fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Number of backend calls served (successful or not).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(width, height)` of every crop received, in call order.
    pub fn crop_sizes(&self) -> Vec<(u32, u32)> {
        self.crops
            .lock()
            .map(|crops| crops.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, frame: &Frame) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut crops) = self.crops.lock() {
            crops.push((frame.width(), frame.height()));
        }
        match &self.failure {
            Some(message) => Err(anyhow!("{}: {}", self.name, message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VisionBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::Classification
        )
    }

    async fn detections(&self, frame: &Frame) -> Result<Vec<Detection>> {
        self.record_call(frame)?;
        Ok(self.detections.clone())
    }

    async fn classifications(&self, frame: &Frame, top_k: usize) -> Result<Vec<Classification>> {
        self.record_call(frame)?;
        Ok(self.classifications.iter().take(top_k).cloned().collect())
    }
}

/// Sensor returning a fixed reading.
pub struct StubSensor {
    name: String,
    reading: serde_json::Value,
}

impl StubSensor {
    pub fn new(name: &str, reading: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            reading,
        }
    }
}

#[async_trait]
impl SensorBackend for StubSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn readings(&self) -> Result<serde_json::Value> {
        Ok(self.reading.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(name: &str, confidence: f64) -> Classification {
        Classification {
            class_name: name.to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn stub_backend_truncates_to_top_k() {
        let backend = StubBackend::new("vision").with_classifications(vec![
            classification("cat", 0.9),
            classification("dog", 0.5),
            classification("bird", 0.1),
        ]);
        let frame = Frame::blank(8, 8);
        let top = backend.classifications(&frame, 1).await.unwrap();
        assert_eq!(top, vec![classification("cat", 0.9)]);
        let all = backend.classifications(&frame, 5).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.crop_sizes(), vec![(8, 8), (8, 8)]);
    }

    #[tokio::test]
    async fn failing_stub_reports_its_name() {
        let backend = StubBackend::new("vision").failing("unavailable");
        let err = backend.detections(&Frame::blank(2, 2)).await.unwrap_err();
        assert_eq!(err.to_string(), "vision: unavailable");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn stub_sensor_returns_reading() {
        let sensor = StubSensor::new("thermo", serde_json::json!({"temp": 21}));
        assert_eq!(
            sensor.readings().await.unwrap(),
            serde_json::json!({"temp": 21})
        );
    }
}
