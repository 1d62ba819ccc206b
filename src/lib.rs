//! Scene IQ
//!
//! Classifies fixed regions of a camera view and rolls the per-region results
//! up into a single scene label.
//!
//! # Architecture
//!
//! A scene is a set of named **groups**. Each group owns the **areas**
//! derived from annotations on a reference image and one backend that
//! classifies them:
//!
//! 1. **Calibration**: on the first cycle, annotations become areas, sorted
//!    into reading order (gaze areas are paired with their target box).
//! 2. **Fan-out**: every cycle crops each area from the camera frame and
//!    classifies all areas concurrently; the cycle commits only if every
//!    area succeeded.
//! 3. **Rules**: expressions over group aggregates (`avg`, `count`,
//!    `avg_max`, `count_max`) pick the scene label; the first truthy rule
//!    wins, otherwise the configured default applies.
//!
//! # Module Structure
//!
//! - `geometry`, `ordering`: normalized boxes, overlap/merge, reading order
//! - `frame`, `ingest`: decoded frames and camera sources
//! - `detect`: backend traits, the stub backends and the backend registry
//! - `area`, `group`, `calibration`: per-region classification and aggregates
//! - `rules`: classification expression parser and evaluator
//! - `service`, `registry`: the per-scene cycle and its shared results
//! - `config`: JSON/TOML configuration with env overrides

pub mod area;
pub mod calibration;
pub mod classification;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod group;
pub mod history;
pub mod ingest;
pub mod ordering;
pub mod registry;
pub mod rules;
pub mod service;
pub mod storage;

pub use area::{Area, AreaKind, AreaReport};
pub use classification::ClassificationValue;
pub use config::SceneConfig;
pub use detect::{
    BackendRegistry, Classification, Detection, DetectionCapability, Resource, SensorBackend,
    StubBackend, StubSensor, VisionBackend,
};
pub use frame::Frame;
pub use geometry::{merge, overlaps, BoundingBox, PixelBox};
pub use group::{Aggregate, Group, GroupKind, GroupReport, GroupSettings};
pub use history::RingBuffer;
pub use ingest::{FileConfig, FileFrameSource, FrameSource};
pub use ordering::sort_reading_order;
pub use registry::{SceneRegistry, SceneSnapshot};
pub use rules::{classify_scene, Rule};
pub use service::{FrameReport, SceneReport, SceneService};
pub use storage::{Annotation, FileReferenceStore, InMemoryReferenceStore, ReferenceStore};
