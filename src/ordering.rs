//! Reading-order sort for calibrated areas.
//!
//! Areas are ordered top-to-bottom in rows, left-to-right within a row. The
//! resulting position becomes the area's stable index.

use crate::geometry::BoundingBox;

/// Row tolerance used when none is configured.
pub const DEFAULT_ROW_TOLERANCE: f64 = 0.02;

/// Sort `items` into reading order.
///
/// Items are sorted by `(y_min, x_min)`, then split into rows whenever an
/// item's `y_min` differs from the previous item's by more than
/// `y_tolerance`. The comparison is chained: a slowly drifting column can
/// stay in one row even when its ends differ by more than the tolerance.
pub fn sort_reading_order<T, F>(items: Vec<T>, dims_of: F, y_tolerance: f64) -> Vec<T>
where
    F: Fn(&T) -> BoundingBox,
{
    let mut keyed: Vec<(BoundingBox, T)> = items.into_iter().map(|t| (dims_of(&t), t)).collect();
    keyed.sort_by(|(a, _), (b, _)| {
        a.y_min
            .total_cmp(&b.y_min)
            .then_with(|| a.x_min.total_cmp(&b.x_min))
    });

    let mut rows: Vec<Vec<(BoundingBox, T)>> = Vec::new();
    let mut prev_y: Option<f64> = None;
    for (dims, item) in keyed {
        let new_row = match prev_y {
            Some(prev) => (dims.y_min - prev).abs() > y_tolerance,
            None => true,
        };
        prev_y = Some(dims.y_min);
        if new_row {
            rows.push(Vec::new());
        }
        if let Some(row) = rows.last_mut() {
            row.push((dims, item));
        }
    }

    rows.into_iter()
        .flat_map(|mut row| {
            row.sort_by(|(a, _), (b, _)| a.x_min.total_cmp(&b.x_min));
            row.into_iter().map(|(_, item)| item)
        })
        .collect()
}
