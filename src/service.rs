//! Scene service: one configured set of groups evaluated against live frames.
//!
//! A cycle grabs one frame per camera, classifies every area concurrently on
//! the calling task and commits the new values only if all of them
//! succeeded. The resulting scene label is published to the shared
//! [`SceneRegistry`].

use anyhow::{anyhow, Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::area::AreaContext;
use crate::calibration::calibrate;
use crate::config::SceneConfig;
use crate::detect::BackendRegistry;
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::group::{Group, GroupReport};
use crate::ingest::FrameSource;
use crate::registry::SceneRegistry;
use crate::rules::classify_scene;
use crate::storage::ReferenceStore;

/// Per-group area reports of one cycle, keyed by group name.
pub type FrameReport = BTreeMap<String, GroupReport>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneReport {
    pub label: String,
    pub groups: FrameReport,
}

struct ServiceState {
    config: SceneConfig,
    groups: Vec<Group>,
    cameras: HashMap<String, Arc<dyn FrameSource>>,
    calibrated: bool,
}

impl ServiceState {
    fn build(config: SceneConfig, backends: &BackendRegistry) -> Result<Self> {
        let mut groups = Vec::with_capacity(config.groups.len());
        for settings in &config.groups {
            let resource = backends
                .resource_for(&settings.resource, settings.kind)
                .with_context(|| format!("group '{}'", settings.name))?;
            groups.push(Group::new(settings.clone(), resource));
        }
        let mut cameras = HashMap::new();
        for name in config.cameras() {
            cameras.insert(name.to_string(), backends.camera(name)?);
        }
        Ok(Self {
            config,
            groups,
            cameras,
            calibrated: false,
        })
    }
}

pub struct SceneService {
    state: Mutex<ServiceState>,
    store: Arc<dyn ReferenceStore>,
    scenes: Arc<SceneRegistry>,
}

impl SceneService {
    /// Resolve every group's backend and camera. Calibration is deferred to
    /// the first cycle.
    pub fn new(
        config: SceneConfig,
        backends: &BackendRegistry,
        store: Arc<dyn ReferenceStore>,
        scenes: Arc<SceneRegistry>,
    ) -> Result<Self> {
        let state = ServiceState::build(config, backends)?;
        log::info!(
            "scene service {} configured with {} group(s)",
            state.config.name,
            state.groups.len()
        );
        Ok(Self {
            state: Mutex::new(state),
            store,
            scenes,
        })
    }

    pub async fn name(&self) -> String {
        self.state.lock().await.config.name.clone()
    }

    pub async fn is_calibrated(&self) -> bool {
        self.state.lock().await.calibrated
    }

    /// Current reports without running a cycle.
    pub async fn reports(&self) -> FrameReport {
        let state = self.state.lock().await;
        frame_report(&state.groups)
    }

    /// Swap in a new configuration. Groups start over with empty history and
    /// are recalibrated on the next cycle. On error the old configuration
    /// stays in place.
    pub async fn reconfigure(&self, config: SceneConfig, backends: &BackendRegistry) -> Result<()> {
        let fresh = ServiceState::build(config, backends)?;
        let mut state = self.state.lock().await;
        // The published scene belongs to the old groups.
        self.scenes.remove(&state.config.name);
        log::info!(
            "scene service {} reconfigured with {} group(s)",
            fresh.config.name,
            fresh.groups.len()
        );
        *state = fresh;
        Ok(())
    }

    /// Run one cycle and return every group's areas.
    pub async fn evaluate_frame(&self) -> Result<FrameReport> {
        let mut state = self.state.lock().await;
        let report = self.run_cycle(&mut state).await?;
        Ok(report.groups)
    }

    /// Scene label and group reports, reusing the last published result
    /// while it is younger than `max_vision_interval`.
    pub async fn scene_classification(&self) -> Result<SceneReport> {
        let mut state = self.state.lock().await;
        if let Some(snapshot) = self.scenes.latest(&state.config.name) {
            if snapshot.is_fresh(state.config.max_vision_interval) {
                log::debug!("{}: reusing scene from the last cycle", state.config.name);
                return Ok(snapshot.report);
            }
        }
        self.run_cycle(&mut state).await
    }

    pub async fn do_command(&self, _command: serde_json::Value) -> Result<serde_json::Value> {
        Err(self.unsupported("do_command").await)
    }

    pub async fn geometries(&self) -> Result<Vec<BoundingBox>> {
        Err(self.unsupported("geometries").await)
    }

    pub async fn point_clouds(&self) -> Result<Vec<u8>> {
        Err(self.unsupported("point_clouds").await)
    }

    async fn unsupported(&self, method: &str) -> anyhow::Error {
        let name = self.name().await;
        log::error!("{}: {} is not implemented", name, method);
        anyhow!("{} is not implemented by scene service {}", method, name)
    }

    async fn run_cycle(&self, state: &mut ServiceState) -> Result<SceneReport> {
        if !state.calibrated {
            calibrate(&mut state.groups, self.store.as_ref())
                .await
                .with_context(|| format!("{}: calibration failed", state.config.name))?;
            state.calibrated = true;
        }
        for group in state.groups.iter_mut() {
            group.stamp_indices();
        }

        let mut frames: HashMap<String, Frame> = HashMap::new();
        for group in &state.groups {
            let camera = &group.settings().camera;
            if frames.contains_key(camera) {
                continue;
            }
            let source = state
                .cameras
                .get(camera)
                .ok_or_else(|| anyhow!("camera '{}' not registered", camera))?;
            let frame = source
                .next_frame()
                .await
                .with_context(|| format!("failed to read a frame from camera '{}'", camera))?;
            frames.insert(camera.clone(), frame);
        }

        let mut jobs = Vec::new();
        for group in &state.groups {
            let frame = frames
                .get(&group.settings().camera)
                .ok_or_else(|| anyhow!("no frame for group '{}'", group.name()))?;
            for area in group.areas() {
                jobs.push(async move {
                    let settings = group.settings();
                    let ctx = AreaContext {
                        resource: group.resource(),
                        frame,
                        ml_class: &settings.ml_class,
                        confidence: settings.confidence,
                    };
                    area.classify(&ctx)
                        .await
                        .with_context(|| format!("group '{}' area {}", group.name(), area.index))
                });
            }
        }
        let values = try_join_all(jobs).await?;

        let mut staged = state.groups.clone();
        let mut values = values.into_iter();
        for group in staged.iter_mut() {
            for area in group.areas_mut() {
                if let Some(value) = values.next() {
                    area.record(value);
                }
            }
        }

        let label = classify_scene(
            &state.config.rules,
            &state.config.default_classification,
            &staged,
        )
        .with_context(|| format!("{}: scene classification failed", state.config.name))?;
        let report = SceneReport {
            label,
            groups: frame_report(&staged),
        };
        state.groups = staged;
        log::debug!("{}: cycle complete, scene is {}", state.config.name, report.label);
        self.scenes.publish(&state.config.name, report.clone());
        Ok(report)
    }
}

fn frame_report(groups: &[Group]) -> FrameReport {
    groups
        .iter()
        .map(|g| (g.name().to_string(), g.report()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, StubBackend};
    use crate::ingest::{FileConfig, FileFrameSource};
    use crate::storage::{Annotation, InMemoryReferenceStore};
    use crate::ClassificationValue;

    const CONFIG: &str = r#"{
        "name": "lobby",
        "camera": "cam",
        "max_vision_interval_seconds": 0,
        "groups": [
            {"name": "seats", "type": "detector_bool", "resource": "det",
             "reference_image": "ref", "from_label": "seat", "ml_class": "person"}
        ],
        "classification_expressions": [
            {"expression": "count(seats) >= 1", "label": "occupied"}
        ]
    }"#;

    fn person() -> Detection {
        Detection {
            class_name: "person".to_string(),
            confidence: 0.9,
            x_min: 0,
            x_max: 5,
            y_min: 0,
            y_max: 5,
        }
    }

    fn backends(stub: StubBackend) -> (BackendRegistry, Arc<StubBackend>) {
        let mut registry = BackendRegistry::new();
        let stub = registry.register_vision(stub);
        registry.register_camera(
            FileFrameSource::new(FileConfig {
                name: "cam".to_string(),
                paths: vec!["stub://100x100".to_string()],
            })
            .unwrap(),
        );
        (registry, stub)
    }

    fn store() -> Arc<InMemoryReferenceStore> {
        Arc::new(InMemoryReferenceStore::new().with_image(
            "ref",
            vec![
                Annotation::new("seat", BoundingBox::new(0.5, 0.7, 0.1, 0.3)),
                Annotation::new("seat", BoundingBox::new(0.1, 0.3, 0.1, 0.3)),
            ],
        ))
    }

    #[tokio::test]
    async fn first_cycle_calibrates_and_records() {
        let (registry, stub) = backends(StubBackend::new("det").with_detections(vec![person()]));
        let scenes = Arc::new(SceneRegistry::new());
        let service = SceneService::new(
            SceneConfig::from_json_str(CONFIG).unwrap(),
            &registry,
            store(),
            scenes.clone(),
        )
        .unwrap();
        assert!(!service.is_calibrated().await);

        let report = service.evaluate_frame().await.unwrap();
        assert!(service.is_calibrated().await);
        let seats = &report["seats"];
        assert_eq!(seats.areas.len(), 2);
        assert_eq!(
            seats.areas[0].classification,
            Some(ClassificationValue::Bool(true))
        );
        assert_eq!(stub.calls(), 2);
        assert_eq!(scenes.latest("lobby").unwrap().report.label, "occupied");
    }

    #[tokio::test]
    async fn failing_backend_leaves_state_untouched() {
        let (registry, _) = backends(StubBackend::new("det").failing("offline"));
        let service = SceneService::new(
            SceneConfig::from_json_str(CONFIG).unwrap(),
            &registry,
            store(),
            Arc::new(SceneRegistry::new()),
        )
        .unwrap();
        let err = service.evaluate_frame().await.unwrap_err();
        assert!(format!("{:#}", err).contains("offline"));
        let reports = service.reports().await;
        assert!(reports["seats"]
            .areas
            .iter()
            .all(|a| a.classification.is_none() && a.history.is_empty()));
    }

    #[tokio::test]
    async fn unimplemented_methods_fail() {
        let (registry, _) = backends(StubBackend::new("det"));
        let service = SceneService::new(
            SceneConfig::from_json_str(CONFIG).unwrap(),
            &registry,
            store(),
            Arc::new(SceneRegistry::new()),
        )
        .unwrap();
        let err = service.do_command(serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("do_command is not implemented"));
        assert!(service.geometries().await.is_err());
        assert!(service.point_clouds().await.is_err());
    }

    #[test]
    fn missing_backend_fails_construction() {
        let registry = BackendRegistry::new();
        let err = SceneService::new(
            SceneConfig::from_json_str(CONFIG).unwrap(),
            &registry,
            store(),
            Arc::new(SceneRegistry::new()),
        )
        .err()
        .unwrap();
        let msg = format!("{:#}", err);
        assert!(msg.contains("group 'seats'"));
        assert!(msg.contains("vision backend 'det' not registered"));
    }
}
