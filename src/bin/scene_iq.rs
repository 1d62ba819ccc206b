//! scene_iq - Run a scene configuration against image files.
//!
//! Backends are scripted stubs loaded from a JSON file, which makes the
//! binary useful for checking a configuration (calibration, ordering, rules)
//! before wiring real models:
//!
//! ```json
//! {
//!   "vision": [{"name": "det", "detections": [...], "classifications": [...]}],
//!   "sensors": [{"name": "temp", "reading": 21.5}]
//! }
//! ```
//!
//! Every camera named by the configuration cycles through `--frames`
//! (a blank 640x480 frame when none are given). Each cycle prints the scene
//! report as one JSON line.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scene_iq::{
    BackendRegistry, Classification, Detection, FileConfig, FileFrameSource, FileReferenceStore,
    SceneConfig, SceneRegistry, SceneService, StubBackend, StubSensor,
};

const DEFAULT_FRAME: &str = "stub://640x480";

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify a scene from annotated areas")]
struct Args {
    /// Scene configuration (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SCENE_IQ_CONFIG")]
    config: PathBuf,

    /// Reference annotations: { "image_id": [ { "label", "x_min", ... } ] }.
    #[arg(long, env = "SCENE_IQ_ANNOTATIONS")]
    annotations: PathBuf,

    /// Scripted vision and sensor backends.
    #[arg(long, env = "SCENE_IQ_BACKENDS")]
    backends: PathBuf,

    /// Image files served as camera frames, in order.
    #[arg(long, num_args = 1..)]
    frames: Vec<String>,

    /// Number of cycles to run.
    #[arg(long, default_value_t = 1)]
    cycles: u32,

    /// Pause between cycles in milliseconds.
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BackendsFile {
    #[serde(default)]
    vision: Vec<VisionStubFile>,
    #[serde(default)]
    sensors: Vec<SensorStubFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VisionStubFile {
    name: String,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    classifications: Vec<Classification>,
    fail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SensorStubFile {
    name: String,
    reading: serde_json::Value,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let config = SceneConfig::load_from(&args.config)?;
    let backends = build_backends(&config, &load_backends(&args.backends)?, &args.frames)?;
    let store = Arc::new(FileReferenceStore::new(&args.annotations));
    let scenes = Arc::new(SceneRegistry::new());

    log::info!("scene_iq starting");
    log::info!("  Scene: {}", config.name);
    log::info!("  Groups: {}", config.groups.len());
    log::info!("  Rules: {}", config.rules.len());
    log::info!("  Backends: {}", backends.list().join(", "));

    let service = SceneService::new(config, &backends, store, scenes)?;

    for cycle in 0..args.cycles {
        if cycle > 0 && args.interval_ms > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(args.interval_ms)) => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("interrupted, stopping after {} cycle(s)", cycle);
                    break;
                }
            }
        }
        let report = tokio::select! {
            report = service.scene_classification() => report?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, stopping after {} cycle(s)", cycle);
                break;
            }
        };
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

fn load_backends(path: &Path) -> Result<BackendsFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read backends file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid backends file {}", path.display()))
}

fn build_backends(
    config: &SceneConfig,
    file: &BackendsFile,
    frames: &[String],
) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for stub in &file.vision {
        let mut backend = StubBackend::new(&stub.name)
            .with_detections(stub.detections.clone())
            .with_classifications(stub.classifications.clone());
        if let Some(message) = &stub.fail {
            backend = backend.failing(message);
        }
        registry.register_vision(backend);
    }
    for stub in &file.sensors {
        registry.register_sensor(StubSensor::new(&stub.name, stub.reading.clone()));
    }

    let paths = if frames.is_empty() {
        vec![DEFAULT_FRAME.to_string()]
    } else {
        frames.to_vec()
    };
    for camera in config.cameras() {
        registry.register_camera(FileFrameSource::new(FileConfig {
            name: camera.to_string(),
            paths: paths.clone(),
        })?);
    }
    Ok(registry)
}
