//! Areas of interest and their per-kind classification.
//!
//! An area is one region of the reference image. Each evaluation cycle it
//! crops the current frame to its region, hands the crop to its group's
//! backend and reduces the response to a single `ClassificationValue`.
//!
//! Computing a value (`classify`) and storing it (`record`) are separate
//! steps so that a cycle can discard every result when any area fails.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::classification::ClassificationValue;
use crate::detect::{Detection, Resource, VisionBackend};
use crate::frame::Frame;
use crate::geometry::{overlaps, BoundingBox, PixelBox};
use crate::history::RingBuffer;

/// Expansion applied when matching a face to the area's own box.
pub const GAZE_FACE_THRESHOLD: f64 = 0.25;
/// Expansion applied when matching a gaze target to the paired box.
pub const GAZE_TARGET_THRESHOLD: f64 = 0.5;
/// Classifier areas request the single best label.
pub const CLASSIFIER_TOP_K: usize = 1;
/// Classifier-bool areas accept a match anywhere in the top five.
pub const CLASSIFIER_BOOL_TOP_K: usize = 5;

/// Per-kind state and reduction rule.
#[derive(Clone, Debug, PartialEq)]
pub enum AreaKind {
    /// Does a face in this area look at the paired "to" region?
    Gaze {
        to_dims: BoundingBox,
        /// Union of `dims` and `to_dims`; the crop sent to the backend.
        full_dims: BoundingBox,
    },
    DetectorBool,
    DetectorCount,
    Classifier,
    ClassifierBool,
    Sensor,
}

/// Inputs shared by every area of a group for one cycle.
pub struct AreaContext<'a> {
    pub resource: &'a Resource,
    pub frame: &'a Frame,
    pub ml_class: &'a str,
    pub confidence: f64,
}

#[derive(Clone, Debug)]
pub struct Area {
    /// Reading-order position within the group.
    pub index: usize,
    dims: BoundingBox,
    kind: AreaKind,
    classification: Option<ClassificationValue>,
    history: RingBuffer<ClassificationValue>,
}

/// Serializable view of an area after a cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AreaReport {
    pub index: usize,
    pub classification: Option<ClassificationValue>,
    pub history: Vec<ClassificationValue>,
}

impl Area {
    pub fn new(kind: AreaKind, dims: BoundingBox, history_size: usize) -> Self {
        Self {
            index: 0,
            dims,
            kind,
            classification: None,
            history: RingBuffer::new(history_size),
        }
    }

    pub fn dims(&self) -> &BoundingBox {
        &self.dims
    }

    pub fn kind(&self) -> &AreaKind {
        &self.kind
    }

    pub fn classification(&self) -> Option<&ClassificationValue> {
        self.classification.as_ref()
    }

    pub fn history(&self) -> &RingBuffer<ClassificationValue> {
        &self.history
    }

    /// Store `value` as the current classification and append it to history.
    ///
    /// Empty values (blank labels, null readings) replace the current value
    /// but are not added to history.
    pub fn record(&mut self, value: ClassificationValue) {
        let entry = (!value.is_empty()).then(|| value.clone());
        self.history.push(entry);
        self.classification = Some(value);
    }

    /// Classify and record in one step.
    pub async fn evaluate(&mut self, ctx: &AreaContext<'_>) -> Result<ClassificationValue> {
        let value = self.classify(ctx).await?;
        self.record(value.clone());
        Ok(value)
    }

    /// Compute this area's value for the frame in `ctx` without mutating it.
    pub async fn classify(&self, ctx: &AreaContext<'_>) -> Result<ClassificationValue> {
        let backend = match (&self.kind, ctx.resource) {
            (AreaKind::Sensor, Resource::Sensor(sensor)) => {
                let reading = sensor
                    .readings()
                    .await
                    .with_context(|| format!("sensor '{}' reading failed", sensor.name()))?;
                return Ok(ClassificationValue::Reading(reading));
            }
            (AreaKind::Sensor, Resource::Vision(backend)) => {
                return Err(anyhow!(
                    "sensor area {} is bound to vision backend '{}'",
                    self.index,
                    backend.name()
                ));
            }
            (_, Resource::Sensor(sensor)) => {
                return Err(anyhow!(
                    "vision area {} is bound to sensor '{}'",
                    self.index,
                    sensor.name()
                ));
            }
            (_, Resource::Vision(backend)) => backend.as_ref(),
        };

        match &self.kind {
            AreaKind::Gaze { to_dims, full_dims } => {
                self.classify_gaze(backend, ctx.frame, to_dims, full_dims)
                    .await
            }
            AreaKind::DetectorBool => {
                let detections = self.detect(backend, ctx.frame, &self.dims).await?;
                let hit = detections
                    .iter()
                    .any(|d| d.matches(ctx.ml_class, ctx.confidence));
                Ok(ClassificationValue::Bool(hit))
            }
            AreaKind::DetectorCount => {
                let detections = self.detect(backend, ctx.frame, &self.dims).await?;
                let count = detections
                    .iter()
                    .filter(|d| d.matches(ctx.ml_class, ctx.confidence))
                    .count();
                Ok(ClassificationValue::Count(count as i64))
            }
            AreaKind::Classifier => {
                let crop = self.crop(ctx.frame, &self.dims)?;
                let ranked = backend
                    .classifications(&crop, CLASSIFIER_TOP_K)
                    .await
                    .with_context(|| self.backend_failure(backend))?;
                let label = ranked
                    .into_iter()
                    .next()
                    .map(|c| c.class_name)
                    .unwrap_or_default();
                Ok(ClassificationValue::Label(label))
            }
            AreaKind::ClassifierBool => {
                let crop = self.crop(ctx.frame, &self.dims)?;
                let ranked = backend
                    .classifications(&crop, CLASSIFIER_BOOL_TOP_K)
                    .await
                    .with_context(|| self.backend_failure(backend))?;
                let hit = ranked
                    .iter()
                    .take(CLASSIFIER_BOOL_TOP_K)
                    .any(|c| c.matches(ctx.ml_class, ctx.confidence));
                Ok(ClassificationValue::Bool(hit))
            }
            AreaKind::Sensor => Err(anyhow!(
                "sensor area {} has no vision reduction",
                self.index
            )),
        }
    }

    pub fn report(&self) -> AreaReport {
        AreaReport {
            index: self.index,
            classification: self.classification.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }

    async fn classify_gaze(
        &self,
        backend: &dyn VisionBackend,
        frame: &Frame,
        to_dims: &BoundingBox,
        full_dims: &BoundingBox,
    ) -> Result<ClassificationValue> {
        let detections = self.detect(backend, frame, full_dims).await?;
        let origin = full_dims.to_absolute(frame.width(), frame.height());
        let face_region: BoundingBox = self.dims.to_absolute(frame.width(), frame.height()).into();
        let target_region: BoundingBox = to_dims.to_absolute(frame.width(), frame.height()).into();

        let looking = pair_gaze_detections(&detections, &origin)
            .into_iter()
            .filter_map(|pair| Some((pair.face?, pair.gaze?)))
            .any(|(face, gaze)| {
                overlaps(&BoundingBox::from(face), &face_region, GAZE_FACE_THRESHOLD)
                    && overlaps(&BoundingBox::from(gaze), &target_region, GAZE_TARGET_THRESHOLD)
            });
        Ok(ClassificationValue::Bool(looking))
    }

    async fn detect(
        &self,
        backend: &dyn VisionBackend,
        frame: &Frame,
        region: &BoundingBox,
    ) -> Result<Vec<Detection>> {
        let crop = self.crop(frame, region)?;
        backend
            .detections(&crop)
            .await
            .with_context(|| self.backend_failure(backend))
    }

    fn crop(&self, frame: &Frame, region: &BoundingBox) -> Result<Frame> {
        frame
            .crop(&region.to_absolute(frame.width(), frame.height()))
            .with_context(|| format!("area {} cannot be cropped", self.index))
    }

    fn backend_failure(&self, backend: &dyn VisionBackend) -> String {
        format!("area {}: backend '{}' call failed", self.index, backend.name())
    }
}

/// Face and gaze detections that share a class suffix (`face_3` / `gaze_3`).
#[derive(Clone, Debug, Default, PartialEq)]
struct GazePair {
    face: Option<PixelBox>,
    gaze: Option<PixelBox>,
}

fn gaze_class_re() -> &'static Regex {
    static GAZE_CLASS_RE: OnceLock<Regex> = OnceLock::new();
    GAZE_CLASS_RE.get_or_init(|| Regex::new(r"^(face|gaze)_(.+)$").unwrap())
}

/// Bucket detections by suffix in first-seen order, translating each box
/// from crop coordinates to frame coordinates. A later detection of the same
/// kind in a bucket replaces the earlier one.
fn pair_gaze_detections(detections: &[Detection], origin: &PixelBox) -> Vec<GazePair> {
    let re = gaze_class_re();
    let mut suffixes: Vec<&str> = Vec::new();
    let mut pairs: Vec<GazePair> = Vec::new();

    for detection in detections {
        let Some(caps) = re.captures(&detection.class_name) else {
            continue;
        };
        let (Some(kind), Some(suffix)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let slot = match suffixes.iter().position(|s| *s == suffix.as_str()) {
            Some(slot) => slot,
            None => {
                suffixes.push(suffix.as_str());
                pairs.push(GazePair::default());
                pairs.len() - 1
            }
        };
        let bounds = detection.bounds().offset_by(origin);
        if kind.as_str() == "face" {
            pairs[slot].face = Some(bounds);
        } else {
            pairs[slot].gaze = Some(bounds);
        }
    }
    pairs
}
