use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, SensorBackend, VisionBackend};
use crate::group::GroupKind;
use crate::ingest::FrameSource;

/// Backend handle owned by a group.
#[derive(Clone)]
pub enum Resource {
    Vision(Arc<dyn VisionBackend>),
    Sensor(Arc<dyn SensorBackend>),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Vision(backend) => backend.name(),
            Resource::Sensor(sensor) => sensor.name(),
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Vision(backend) => write!(f, "Vision({})", backend.name()),
            Resource::Sensor(sensor) => write!(f, "Sensor({})", sensor.name()),
        }
    }
}

/// Named vision backends, sensors and cameras available to a service.
///
/// Everything is shared behind `Arc`; backends take `&self` and handle their
/// own synchronization.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    vision: HashMap<String, Arc<dyn VisionBackend>>,
    sensors: HashMap<String, Arc<dyn SensorBackend>>,
    cameras: HashMap<String, Arc<dyn FrameSource>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vision backend under its own name.
    pub fn register_vision<B: VisionBackend + 'static>(&mut self, backend: B) -> Arc<B> {
        let backend = Arc::new(backend);
        self.vision
            .insert(backend.name().to_string(), backend.clone() as Arc<dyn VisionBackend>);
        backend
    }

    pub fn register_sensor<S: SensorBackend + 'static>(&mut self, sensor: S) -> Arc<S> {
        let sensor = Arc::new(sensor);
        self.sensors
            .insert(sensor.name().to_string(), sensor.clone() as Arc<dyn SensorBackend>);
        sensor
    }

    pub fn register_camera<C: FrameSource + 'static>(&mut self, camera: C) -> Arc<C> {
        let camera = Arc::new(camera);
        self.cameras
            .insert(camera.name().to_string(), camera.clone() as Arc<dyn FrameSource>);
        camera
    }

    pub fn vision(&self, name: &str) -> Option<Arc<dyn VisionBackend>> {
        self.vision.get(name).cloned()
    }

    pub fn sensor(&self, name: &str) -> Option<Arc<dyn SensorBackend>> {
        self.sensors.get(name).cloned()
    }

    pub fn camera(&self, name: &str) -> Result<Arc<dyn FrameSource>> {
        self.cameras
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("camera '{}' not registered", name))
    }

    /// List registered resource names (vision, sensors, cameras).
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vision
            .keys()
            .chain(self.sensors.keys())
            .chain(self.cameras.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Resolve the backend a group of `kind` will call.
    ///
    /// Sensor groups need a sensor; every other kind needs a vision backend
    /// that supports the capability the kind relies on.
    pub fn resource_for(&self, name: &str, kind: GroupKind) -> Result<Resource> {
        match kind.required_capability() {
            None => self
                .sensor(name)
                .map(Resource::Sensor)
                .ok_or_else(|| anyhow!("sensor '{}' not registered", name)),
            Some(capability) => {
                let backend = self
                    .vision(name)
                    .ok_or_else(|| anyhow!("vision backend '{}' not registered", name))?;
                ensure_supports(backend.as_ref(), capability)?;
                Ok(Resource::Vision(backend))
            }
        }
    }
}

fn ensure_supports(backend: &dyn VisionBackend, capability: DetectionCapability) -> Result<()> {
    if backend.supports(capability) {
        Ok(())
    } else {
        Err(anyhow!(
            "vision backend '{}' does not support {:?}",
            backend.name(),
            capability
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{StubBackend, StubSensor};
    use crate::detect::result::{Classification, Detection};
    use crate::frame::Frame;
    use async_trait::async_trait;

    struct ClassifierOnly;

    #[async_trait]
    impl VisionBackend for ClassifierOnly {
        fn name(&self) -> &str {
            "classifier_only"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            matches!(capability, DetectionCapability::Classification)
        }

        async fn detections(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow!("detections unsupported"))
        }

        async fn classifications(
            &self,
            _frame: &Frame,
            _top_k: usize,
        ) -> Result<Vec<Classification>> {
            Ok(vec![])
        }
    }

    #[test]
    fn resolves_by_kind() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(StubBackend::new("vision"));
        registry.register_sensor(StubSensor::new("thermo", serde_json::json!(1)));

        let vision = registry
            .resource_for("vision", GroupKind::DetectorBool)
            .unwrap();
        assert!(matches!(vision, Resource::Vision(_)));
        assert_eq!(vision.name(), "vision");

        let sensor = registry.resource_for("thermo", GroupKind::Sensor).unwrap();
        assert!(matches!(sensor, Resource::Sensor(_)));

        // A sensor name cannot back a vision group and vice versa.
        assert!(registry.resource_for("thermo", GroupKind::Gaze).is_err());
        assert!(registry.resource_for("vision", GroupKind::Sensor).is_err());
        assert!(registry.resource_for("missing", GroupKind::Classifier).is_err());
    }

    #[test]
    fn rejects_missing_capability() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(ClassifierOnly);
        assert!(registry
            .resource_for("classifier_only", GroupKind::ClassifierBool)
            .is_ok());
        let err = registry
            .resource_for("classifier_only", GroupKind::DetectorCount)
            .unwrap_err();
        assert!(err.to_string().contains("does not support"));
    }

    #[test]
    fn lists_all_names_sorted() {
        let mut registry = BackendRegistry::new();
        registry.register_vision(StubBackend::new("b"));
        registry.register_sensor(StubSensor::new("a", serde_json::Value::Null));
        assert_eq!(registry.list(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.camera("front").is_err());
    }
}
