use anyhow::Result;
use async_trait::async_trait;

use crate::detect::result::{Classification, Detection};
use crate::frame::Frame;

/// What a vision backend can be asked to do.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    ObjectDetection,
    Classification,
}

/// Remote (or local) vision service used by area evaluation.
///
/// Calls are fallible and have no intrinsic timeout; the caller decides how
/// long a whole evaluation cycle may take.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Resource name the backend is registered under.
    fn name(&self) -> &str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a (cropped) frame.
    ///
    /// Boxes are absolute pixel coordinates relative to `frame`.
    async fn detections(&self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Ranked classifications, at most `top_k`, best first.
    async fn classifications(&self, frame: &Frame, top_k: usize) -> Result<Vec<Classification>>;
}

/// Backend whose reading is passed through verbatim by sensor areas.
#[async_trait]
pub trait SensorBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn readings(&self) -> Result<serde_json::Value>;
}
