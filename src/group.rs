use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaKind, AreaReport};
use crate::classification::ClassificationValue;
use crate::detect::{DetectionCapability, Resource};

/// Kind of every area in a group; chosen once from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Gaze,
    DetectorBool,
    DetectorCount,
    Classifier,
    ClassifierBool,
    Sensor,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Gaze => "gaze",
            GroupKind::DetectorBool => "detector_bool",
            GroupKind::DetectorCount => "detector_count",
            GroupKind::Classifier => "classifier",
            GroupKind::ClassifierBool => "classifier_bool",
            GroupKind::Sensor => "sensor",
        }
    }

    /// Vision capability the kind relies on; `None` for sensors.
    pub fn required_capability(&self) -> Option<DetectionCapability> {
        match self {
            GroupKind::Gaze | GroupKind::DetectorBool | GroupKind::DetectorCount => {
                Some(DetectionCapability::ObjectDetection)
            }
            GroupKind::Classifier | GroupKind::ClassifierBool => {
                Some(DetectionCapability::Classification)
            }
            GroupKind::Sensor => None,
        }
    }

    /// Kinds whose reduction compares against `ml_class`.
    pub fn needs_ml_class(&self) -> bool {
        matches!(
            self,
            GroupKind::DetectorBool | GroupKind::DetectorCount | GroupKind::ClassifierBool
        )
    }

    /// Area kind for a non-gaze group. Gaze areas need their paired boxes
    /// and are built by calibration instead.
    pub(crate) fn simple_area_kind(&self) -> Option<AreaKind> {
        match self {
            GroupKind::Gaze => None,
            GroupKind::DetectorBool => Some(AreaKind::DetectorBool),
            GroupKind::DetectorCount => Some(AreaKind::DetectorCount),
            GroupKind::Classifier => Some(AreaKind::Classifier),
            GroupKind::ClassifierBool => Some(AreaKind::ClassifierBool),
            GroupKind::Sensor => Some(AreaKind::Sensor),
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated per-group parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSettings {
    pub name: String,
    pub kind: GroupKind,
    /// Backend resource name.
    pub resource: String,
    pub reference_image: String,
    pub from_label: String,
    pub to_label: String,
    pub ml_class: String,
    pub confidence: f64,
    /// Camera the group's frames come from.
    pub camera: String,
    pub history_size: usize,
    pub row_tolerance: f64,
}

/// Named set of areas sharing one backend and one set of parameters.
#[derive(Clone, Debug)]
pub struct Group {
    settings: GroupSettings,
    resource: Resource,
    areas: Vec<Area>,
}

/// Serializable view of a group after a cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub areas: Vec<AreaReport>,
}

/// Aggregate functions available to classification rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    /// Sum of the coerced values (historical name).
    Count,
    AvgMax(usize),
    CountMax(usize),
}

impl Aggregate {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Count => "count",
            Aggregate::AvgMax(_) => "avg_max",
            Aggregate::CountMax(_) => "count_max",
        }
    }
}

impl Group {
    pub fn new(settings: GroupSettings, resource: Resource) -> Self {
        Self {
            settings,
            resource,
            areas: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> GroupKind {
        self.settings.kind
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn areas_mut(&mut self) -> &mut [Area] {
        &mut self.areas
    }

    /// Replace all areas; order is taken as the final reading order.
    pub fn set_areas(&mut self, areas: Vec<Area>) {
        self.areas = areas;
        self.stamp_indices();
    }

    /// Re-derive each area's index from its position.
    pub fn stamp_indices(&mut self) {
        for (i, area) in self.areas.iter_mut().enumerate() {
            area.index = i;
        }
    }

    pub fn report(&self) -> GroupReport {
        GroupReport {
            name: self.settings.name.clone(),
            areas: self.areas.iter().map(Area::report).collect(),
        }
    }

    /// Mean of the current classifications; 0 for an empty group.
    pub fn avg(&self) -> Result<f64> {
        let values = self.current_values()?;
        Ok(mean(&values))
    }

    /// Sum of the current classifications.
    pub fn count(&self) -> Result<f64> {
        let values = self.current_values()?;
        Ok(values.iter().sum::<i64>() as f64)
    }

    /// Mean over areas of each area's maximum among its newest `x` history
    /// entries (0 when it has none).
    pub fn avg_max(&self, x: usize) -> Result<f64> {
        let maxima = self.recent_maxima(x)?;
        Ok(mean(&maxima))
    }

    /// Sum over areas of each area's recent maximum.
    pub fn count_max(&self, x: usize) -> Result<f64> {
        let maxima = self.recent_maxima(x)?;
        Ok(maxima.iter().sum::<i64>() as f64)
    }

    pub fn aggregate(&self, func: Aggregate) -> Result<f64> {
        let result = match func {
            Aggregate::Avg => self.avg(),
            Aggregate::Count => self.count(),
            Aggregate::AvgMax(x) => self.avg_max(x),
            Aggregate::CountMax(x) => self.count_max(x),
        };
        result.with_context(|| format!("{}({}) failed", func.name(), self.settings.name))
    }

    fn current_values(&self) -> Result<Vec<i64>> {
        self.areas
            .iter()
            .map(|area| match area.classification() {
                Some(value) => value
                    .as_number()
                    .with_context(|| format!("area {}", area.index)),
                None => Ok(0),
            })
            .collect()
    }

    fn recent_maxima(&self, x: usize) -> Result<Vec<i64>> {
        self.areas
            .iter()
            .map(|area| {
                let recent: Vec<i64> = area
                    .history()
                    .recent(x)
                    .map(ClassificationValue::as_number)
                    .collect::<Result<_>>()
                    .with_context(|| format!("area {}", area.index))?;
                Ok(recent.into_iter().max().unwrap_or(0))
            })
            .collect()
    }
}

/// Look up `name` in `groups` and compute `func` over it.
///
/// An unknown group name yields 0 rather than an error so rules referencing
/// a group that was removed from configuration keep evaluating.
pub fn aggregate(groups: &[Group], func: Aggregate, name: &str) -> Result<f64> {
    match groups.iter().find(|g| g.name() == name) {
        Some(group) => group.aggregate(func),
        None => {
            log::debug!("{}({}) references an unknown group; using 0", func.name(), name);
            Ok(0.0)
        }
    }
}

fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<i64>() as f64 / values.len() as f64
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::geometry::BoundingBox;
    use std::sync::Arc;

    pub(crate) fn settings(name: &str, kind: GroupKind) -> GroupSettings {
        GroupSettings {
            name: name.to_string(),
            kind,
            resource: "vision".to_string(),
            reference_image: "ref".to_string(),
            from_label: "seat".to_string(),
            to_label: String::new(),
            ml_class: "person".to_string(),
            confidence: 0.7,
            camera: "cam".to_string(),
            history_size: 10,
            row_tolerance: 0.07,
        }
    }

    /// Group whose areas have been recorded with `values`, oldest first.
    pub(crate) fn group_with_history(name: &str, histories: &[&[ClassificationValue]]) -> Group {
        let mut group = Group::new(
            settings(name, GroupKind::DetectorCount),
            Resource::Vision(Arc::new(StubBackend::new("vision"))),
        );
        let areas = histories
            .iter()
            .map(|values| {
                let mut area = Area::new(
                    AreaKind::DetectorCount,
                    BoundingBox::new(0.0, 0.1, 0.0, 0.1),
                    10,
                );
                for v in values.iter() {
                    area.record(v.clone());
                }
                area
            })
            .collect();
        group.set_areas(areas);
        group
    }

    fn bools(values: &[bool]) -> Vec<ClassificationValue> {
        values.iter().map(|b| ClassificationValue::Bool(*b)).collect()
    }

    #[test]
    fn avg_and_count_coerce_booleans() {
        let a = bools(&[true]);
        let b = bools(&[false]);
        let c = bools(&[true]);
        let d = bools(&[true]);
        let group = group_with_history("seats", &[&a, &b, &c, &d]);
        assert_eq!(group.avg().unwrap(), 0.75);
        assert_eq!(group.count().unwrap(), 3.0);
    }

    #[test]
    fn empty_group_aggregates_to_zero() {
        let group = group_with_history("empty", &[]);
        assert_eq!(group.avg().unwrap(), 0.0);
        assert_eq!(group.count().unwrap(), 0.0);
        assert_eq!(group.avg_max(3).unwrap(), 0.0);
        assert_eq!(group.count_max(3).unwrap(), 0.0);
    }

    #[test]
    fn avg_max_reads_only_newest_entries() {
        // Recorded oldest first, so history reads newest-first as [5, 1, 9].
        let history = vec![
            ClassificationValue::Count(9),
            ClassificationValue::Count(1),
            ClassificationValue::Count(5),
        ];
        let group = group_with_history("counts", &[&history]);
        assert_eq!(group.avg_max(2).unwrap(), 5.0);
        assert_eq!(group.avg_max(3).unwrap(), 9.0);
        assert_eq!(group.avg_max(0).unwrap(), 0.0);
    }

    #[test]
    fn count_max_sums_per_area_maxima() {
        let a = vec![ClassificationValue::Count(2), ClassificationValue::Count(4)];
        let b = vec![ClassificationValue::Count(3)];
        let c: Vec<ClassificationValue> = vec![];
        let group = group_with_history("counts", &[&a, &b, &c]);
        assert_eq!(group.count_max(5).unwrap(), 7.0);
        assert!((group.avg_max(5).unwrap() - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn non_numeric_labels_fail() {
        let labels = vec![ClassificationValue::from("open")];
        let group = group_with_history("doors", &[&labels]);
        let err = group.aggregate(Aggregate::Avg).unwrap_err();
        assert!(format!("{:#}", err).contains("avg(doors)"));
        let numeric = vec![ClassificationValue::from("4")];
        let group = group_with_history("doors", &[&numeric]);
        assert_eq!(group.count().unwrap(), 4.0);
    }

    #[test]
    fn unset_classification_counts_as_zero() {
        let a = bools(&[true]);
        let mut group = group_with_history("seats", &[&a]);
        let mut areas: Vec<Area> = group.areas().to_vec();
        areas.push(Area::new(
            AreaKind::DetectorBool,
            BoundingBox::new(0.5, 0.6, 0.0, 0.1),
            10,
        ));
        group.set_areas(areas);
        assert_eq!(group.avg().unwrap(), 0.5);
    }

    #[test]
    fn unknown_group_is_zero() {
        let a = bools(&[true]);
        let groups = vec![group_with_history("seats", &[&a])];
        assert_eq!(aggregate(&groups, Aggregate::Count, "seats").unwrap(), 1.0);
        assert_eq!(aggregate(&groups, Aggregate::Avg, "missing").unwrap(), 0.0);
        assert_eq!(
            aggregate(&groups, Aggregate::CountMax(3), "missing").unwrap(),
            0.0
        );
    }

    #[test]
    fn indices_follow_position() {
        let a = bools(&[true]);
        let group = group_with_history("seats", &[&a, &a, &a]);
        let indices: Vec<usize> = group.areas().iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
