//! Process-wide view of the latest scene result per service.
//!
//! Each service publishes under its own name after every successful cycle;
//! anything else holding the registry can read the result without touching
//! the service's group state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::time::Instant;

use crate::service::SceneReport;

#[derive(Clone, Debug, PartialEq)]
pub struct SceneSnapshot {
    pub report: SceneReport,
    pub evaluated_at: Instant,
}

impl SceneSnapshot {
    /// Snapshot is no older than `max_age`.
    pub fn is_fresh(&self, max_age: std::time::Duration) -> bool {
        self.evaluated_at.elapsed() < max_age
    }
}

#[derive(Debug, Default)]
pub struct SceneRegistry {
    scenes: RwLock<HashMap<String, SceneSnapshot>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, name: &str, report: SceneReport) {
        let snapshot = SceneSnapshot {
            report,
            evaluated_at: Instant::now(),
        };
        let mut scenes = self.scenes.write().unwrap_or_else(PoisonError::into_inner);
        scenes.insert(name.to_string(), snapshot);
    }

    pub fn latest(&self, name: &str) -> Option<SceneSnapshot> {
        let scenes = self.scenes.read().unwrap_or_else(PoisonError::into_inner);
        scenes.get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<SceneSnapshot> {
        let mut scenes = self.scenes.write().unwrap_or_else(PoisonError::into_inner);
        scenes.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let scenes = self.scenes.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = scenes.keys().cloned().collect();
        names.sort();
        names
    }
}
