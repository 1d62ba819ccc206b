//! One-time derivation of area boxes from reference annotations.
//!
//! Every annotation labeled with a group's `from_label` becomes one area.
//! Gaze groups additionally pair each area with the first annotation labeled
//! `to_label` that overlaps it and crop the union of the two.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

use crate::area::{Area, AreaKind};
use crate::geometry::{merge, overlaps, BoundingBox};
use crate::group::{Group, GroupKind, GroupSettings};
use crate::ordering::sort_reading_order;
use crate::storage::{Annotation, ReferenceStore};

/// Expansion used when pairing a gaze area with its target box.
pub const GAZE_PAIR_THRESHOLD: f64 = 0.0;
/// Padding applied to the merged gaze crop.
pub const FULL_DIMS_PADDING: f64 = 0.03;

/// Build the ordered areas of one group from its reference annotations.
pub fn build_areas(settings: &GroupSettings, annotations: &[Annotation]) -> Result<Vec<Area>> {
    let mut seeds: Vec<BoundingBox> = Vec::new();
    let mut targets: Vec<BoundingBox> = Vec::new();
    for annotation in annotations {
        if annotation.label == settings.from_label {
            seeds.push(annotation.dims());
        } else if settings.kind == GroupKind::Gaze
            && !settings.to_label.is_empty()
            && annotation.label == settings.to_label
        {
            targets.push(annotation.dims());
        }
    }

    if seeds.is_empty() {
        return Err(anyhow!(
            "no annotations labeled '{}' on reference image '{}'",
            settings.from_label,
            settings.reference_image
        ));
    }

    let ordered = sort_reading_order(seeds, |dims| *dims, settings.row_tolerance);

    let mut areas = Vec::with_capacity(ordered.len());
    for (index, dims) in ordered.into_iter().enumerate() {
        let kind = match settings.kind.simple_area_kind() {
            Some(kind) => kind,
            None => pair_gaze(index, &dims, &targets, settings)?,
        };
        let mut area = Area::new(kind, dims, settings.history_size);
        area.index = index;
        areas.push(area);
    }
    Ok(areas)
}

fn pair_gaze(
    index: usize,
    dims: &BoundingBox,
    targets: &[BoundingBox],
    settings: &GroupSettings,
) -> Result<AreaKind> {
    match targets
        .iter()
        .find(|target| overlaps(dims, target, GAZE_PAIR_THRESHOLD))
    {
        Some(to_dims) => Ok(AreaKind::Gaze {
            to_dims: *to_dims,
            full_dims: merge(dims, to_dims, FULL_DIMS_PADDING),
        }),
        None => {
            log::warn!(
                "group {}: gaze area {} has no overlapping '{}' annotation",
                settings.name,
                index,
                settings.to_label
            );
            Err(anyhow!(
                "gaze area {} at ({:.3}, {:.3}) has no overlapping '{}' annotation",
                index,
                dims.x_min,
                dims.y_min,
                settings.to_label
            ))
        }
    }
}

/// Replace the areas of one group.
pub fn calibrate_group(group: &mut Group, annotations: &[Annotation]) -> Result<()> {
    let areas = build_areas(group.settings(), annotations)
        .with_context(|| format!("calibration of group '{}' failed", group.name()))?;
    log::info!(
        "group {} calibrated: {} {} area(s) from reference image {}",
        group.name(),
        areas.len(),
        group.kind(),
        group.settings().reference_image
    );
    group.set_areas(areas);
    Ok(())
}

/// Calibrate every group, fetching each reference image once.
///
/// Either every group is recalibrated or none is.
pub async fn calibrate(groups: &mut [Group], store: &dyn ReferenceStore) -> Result<()> {
    let mut fetched: HashMap<String, Vec<Annotation>> = HashMap::new();
    for group in groups.iter() {
        let image_id = &group.settings().reference_image;
        if fetched.contains_key(image_id) {
            continue;
        }
        let annotations = store
            .fetch_annotations(image_id)
            .await
            .with_context(|| format!("calibration of group '{}' failed", group.name()))?;
        fetched.insert(image_id.clone(), annotations);
    }

    let mut staged = groups.to_vec();
    for group in staged.iter_mut() {
        let annotations = fetched
            .get(&group.settings().reference_image)
            .map(Vec::as_slice)
            .unwrap_or_default();
        calibrate_group(group, annotations)?;
    }
    for (group, calibrated) in groups.iter_mut().zip(staged) {
        *group = calibrated;
    }
    Ok(())
}
