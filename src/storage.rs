//! Reference image annotations.
//!
//! Calibration fetches the stored bounding boxes of a reference image once
//! per image. Where they live is up to the deployment; two stores ship here:
//! an in-memory map and a JSON file keyed by image id.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::geometry::BoundingBox;

/// One labeled box on a reference image, normalized to 0..1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub label: String,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Annotation {
    pub fn new(label: &str, dims: BoundingBox) -> Self {
        Self {
            label: label.to_string(),
            x_min: dims.x_min,
            x_max: dims.x_max,
            y_min: dims.y_min,
            y_max: dims.y_max,
        }
    }

    pub fn dims(&self) -> BoundingBox {
        BoundingBox::new(self.x_min, self.x_max, self.y_min, self.y_max)
    }
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// All annotations attached to `image_id`. Unknown ids are an error.
    async fn fetch_annotations(&self, image_id: &str) -> Result<Vec<Annotation>>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryReferenceStore {
    images: HashMap<String, Vec<Annotation>>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image_id: &str, annotations: Vec<Annotation>) {
        self.images.insert(image_id.to_string(), annotations);
    }

    pub fn with_image(mut self, image_id: &str, annotations: Vec<Annotation>) -> Self {
        self.insert(image_id, annotations);
        self
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn fetch_annotations(&self, image_id: &str) -> Result<Vec<Annotation>> {
        self.images
            .get(image_id)
            .cloned()
            .ok_or_else(|| anyhow!("reference image '{}' not found", image_id))
    }
}

/// JSON file of the form `{ "image_id": [ { "label": ..., "x_min": ... } ] }`.
///
/// The file is re-read on every fetch so edits take effect at the next
/// calibration.
#[derive(Clone, Debug)]
pub struct FileReferenceStore {
    path: PathBuf,
}

impl FileReferenceStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn read(&self) -> Result<HashMap<String, Vec<Annotation>>> {
        let raw = std::fs::read_to_string(&self.path).with_context(|| {
            format!("failed to read annotations file {}", self.path.display())
        })?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid annotations file {}", self.path.display()))
    }
}

#[async_trait]
impl ReferenceStore for FileReferenceStore {
    async fn fetch_annotations(&self, image_id: &str) -> Result<Vec<Annotation>> {
        let mut images = self.read()?;
        images.remove(image_id).ok_or_else(|| {
            anyhow!(
                "reference image '{}' not found in {}",
                image_id,
                self.path.display()
            )
        })
    }
}
