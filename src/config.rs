use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::group::{GroupKind, GroupSettings};
use crate::history::DEFAULT_HISTORY_SIZE;
use crate::rules::Rule;

const DEFAULT_SERVICE_NAME: &str = "scene-iq";
const DEFAULT_CLASSIFICATION: &str = "unknown";
const DEFAULT_MAX_VISION_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_CONFIDENCE: f64 = 0.7;
const DEFAULT_ROW_TOLERANCE: f64 = 0.07;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SceneConfigFile {
    name: Option<String>,
    camera: Option<String>,
    #[serde(default)]
    groups: Vec<GroupConfigFile>,
    max_vision_interval_seconds: Option<f64>,
    default_classification: Option<String>,
    #[serde(default)]
    classification_expressions: Vec<ExpressionConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupConfigFile {
    name: String,
    #[serde(rename = "type")]
    kind: GroupKind,
    resource: String,
    reference_image: String,
    from_label: String,
    to_label: Option<String>,
    ml_class: Option<String>,
    confidence: Option<f64>,
    camera: Option<String>,
    history_size: Option<usize>,
    row_tolerance: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpressionConfigFile {
    expression: String,
    label: String,
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub name: String,
    /// Default camera for groups that do not name their own.
    pub camera: String,
    pub groups: Vec<GroupSettings>,
    pub max_vision_interval: Duration,
    pub default_classification: String,
    pub rules: Vec<Rule>,
}

impl SceneConfig {
    /// Load from the file named by `SCENE_IQ_CONFIG`, then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCENE_IQ_CONFIG")
            .map_err(|_| anyhow!("SCENE_IQ_CONFIG must name a configuration file"))?;
        Self::load_from(Path::new(&config_path))
    }

    /// Load `path`, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let file_cfg = read_config_file(path)?;
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: SceneConfigFile = serde_json::from_str(raw).context("invalid config")?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Names of every camera referenced by a group, in first-use order.
    pub fn cameras(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for group in &self.groups {
            if !seen.contains(&group.camera.as_str()) {
                seen.push(group.camera.as_str());
            }
        }
        seen
    }

    fn from_file(file: SceneConfigFile) -> Result<Self> {
        let name = file
            .name
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let camera = file.camera.unwrap_or_default();
        let max_vision_interval = interval_from_secs(
            file.max_vision_interval_seconds
                .unwrap_or(DEFAULT_MAX_VISION_INTERVAL_SECS),
        )?;
        let default_classification = file
            .default_classification
            .unwrap_or_else(|| DEFAULT_CLASSIFICATION.to_string());

        let groups = file
            .groups
            .into_iter()
            .map(|group| GroupSettings {
                name: group.name,
                kind: group.kind,
                resource: group.resource,
                reference_image: group.reference_image,
                from_label: group.from_label,
                to_label: group.to_label.unwrap_or_default(),
                ml_class: group.ml_class.unwrap_or_default(),
                confidence: group.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                // Empty until validate() falls back to the service camera.
                camera: group.camera.unwrap_or_default(),
                history_size: group.history_size.unwrap_or(DEFAULT_HISTORY_SIZE),
                row_tolerance: group.row_tolerance.unwrap_or(DEFAULT_ROW_TOLERANCE),
            })
            .collect();

        let rules = file
            .classification_expressions
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                Rule::parse(&expr.expression, &expr.label)
                    .with_context(|| format!("classification_expressions[{}]", i))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            camera,
            groups,
            max_vision_interval,
            default_classification,
            rules,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = std::env::var("SCENE_IQ_NAME") {
            if !name.trim().is_empty() {
                self.name = name;
            }
        }
        if let Ok(camera) = std::env::var("SCENE_IQ_CAMERA") {
            if !camera.trim().is_empty() {
                self.camera = camera;
            }
        }
        if let Ok(label) = std::env::var("SCENE_IQ_DEFAULT_CLASSIFICATION") {
            if !label.trim().is_empty() {
                self.default_classification = label;
            }
        }
        if let Ok(interval) = std::env::var("SCENE_IQ_MAX_VISION_INTERVAL_SECS") {
            let seconds: f64 = interval.trim().parse().map_err(|_| {
                anyhow!("SCENE_IQ_MAX_VISION_INTERVAL_SECS must be a number of seconds")
            })?;
            self.max_vision_interval = interval_from_secs(seconds)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("name must not be empty"));
        }
        if self.camera.trim().is_empty() {
            return Err(anyhow!("camera is required"));
        }
        if self.groups.is_empty() {
            return Err(anyhow!("at least one group is required"));
        }

        let mut names = HashSet::new();
        for group in &mut self.groups {
            validate_group(group)
                .with_context(|| format!("invalid group '{}'", group.name))?;
            if !names.insert(group.name.clone()) {
                return Err(anyhow!("duplicate group name '{}'", group.name));
            }
            if group.camera.is_empty() {
                group.camera = self.camera.clone();
            }
        }

        for rule in &self.rules {
            for referenced in rule.expression().groups() {
                if !names.contains(referenced) {
                    log::warn!(
                        "rule {:?} references unknown group '{}'; it will read as 0",
                        rule.source(),
                        referenced
                    );
                }
            }
        }
        Ok(())
    }
}

fn validate_group(group: &GroupSettings) -> Result<()> {
    if !group_name_regex().is_match(&group.name) {
        return Err(anyhow!(
            "group name must match ^[A-Za-z_][A-Za-z0-9_]*$ to be usable in expressions"
        ));
    }
    for (field, value) in [
        ("resource", &group.resource),
        ("reference_image", &group.reference_image),
        ("from_label", &group.from_label),
    ] {
        if value.trim().is_empty() {
            return Err(anyhow!("{} is required", field));
        }
    }
    if group.kind == GroupKind::Gaze && group.to_label.trim().is_empty() {
        return Err(anyhow!("to_label is required for gaze groups"));
    }
    if group.kind.needs_ml_class() && group.ml_class.trim().is_empty() {
        return Err(anyhow!("ml_class is required for {} groups", group.kind));
    }
    if !(0.0..=1.0).contains(&group.confidence) {
        return Err(anyhow!("confidence must be within [0, 1]"));
    }
    if group.history_size == 0 {
        return Err(anyhow!("history_size must be at least 1"));
    }
    if !group.row_tolerance.is_finite() || group.row_tolerance < 0.0 {
        return Err(anyhow!("row_tolerance must be a non-negative number"));
    }
    Ok(())
}

fn group_name_regex() -> &'static Regex {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("group name regex"))
}

fn interval_from_secs(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        anyhow!(
            "max_vision_interval_seconds must be a non-negative number of seconds (got {})",
            seconds
        )
    })
}

fn read_config_file(path: &Path) -> Result<SceneConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
