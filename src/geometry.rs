//! Bounding-box arithmetic shared by calibration and area evaluation.
//!
//! Boxes are normalized to the reference image (0..1) unless converted with
//! [`BoundingBox::to_absolute`]. Detections returned by vision backends are
//! already absolute and are compared as [`PixelBox`]es lifted to `f64`.

use serde::{Deserialize, Serialize};

/// Axis-aligned box. `x_min <= x_max` and `y_min <= y_max` are the caller's
/// obligation; nothing here reorders corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Absolute pixel box for a specific frame size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl BoundingBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Grow the box by `fraction` of its own width/height on every side.
    pub fn expand(&self, fraction: f64) -> Self {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Self {
            x_min: self.x_min - dx,
            x_max: self.x_max + dx,
            y_min: self.y_min - dy,
            y_max: self.y_max + dy,
        }
    }

    /// Inclusive containment.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x_min <= other.x_min
            && self.x_max >= other.x_max
            && self.y_min <= other.y_min
            && self.y_max >= other.y_max
    }

    /// Strict intersection; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x_min < other.x_max
            && self.x_max > other.x_min
            && self.y_min < other.y_max
            && self.y_max > other.y_min
    }

    /// Convert normalized coordinates to pixels, truncating toward zero.
    pub fn to_absolute(&self, width: u32, height: u32) -> PixelBox {
        let w = width as f64;
        let h = height as f64;
        PixelBox {
            x_min: (self.x_min * w) as i64,
            x_max: (self.x_max * w) as i64,
            y_min: (self.y_min * h) as i64,
            y_max: (self.y_max * h) as i64,
        }
    }
}

impl PixelBox {
    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Shift by another box's top-left corner (crop-local to frame coordinates).
    pub fn offset_by(&self, origin: &PixelBox) -> Self {
        Self {
            x_min: self.x_min + origin.x_min,
            x_max: self.x_max + origin.x_min,
            y_min: self.y_min + origin.y_min,
            y_max: self.y_max + origin.y_min,
        }
    }
}

impl From<PixelBox> for BoundingBox {
    fn from(b: PixelBox) -> Self {
        BoundingBox {
            x_min: b.x_min as f64,
            x_max: b.x_max as f64,
            y_min: b.y_min as f64,
            y_max: b.y_max as f64,
        }
    }
}

/// Overlap test used for area pairing and gaze matching.
///
/// Each box is expanded by `threshold` times its own size, then the pair
/// counts as overlapping when the expanded boxes intersect or either one
/// contains the other. A box nested inside another therefore always
/// overlaps, whatever the threshold.
pub fn overlaps(a: &BoundingBox, b: &BoundingBox, threshold: f64) -> bool {
    let a = a.expand(threshold);
    let b = b.expand(threshold);
    a.intersects(&b) || a.contains(&b) || b.contains(&a)
}

/// Union of two boxes, each bound pushed outward by `padding` times its own
/// coordinate value (not the box size).
pub fn merge(a: &BoundingBox, b: &BoundingBox, padding: f64) -> BoundingBox {
    let x_min = a.x_min.min(b.x_min);
    let x_max = a.x_max.max(b.x_max);
    let y_min = a.y_min.min(b.y_min);
    let y_max = a.y_max.max(b.y_max);
    BoundingBox {
        x_min: x_min - padding * x_min,
        x_max: x_max + padding * x_max,
        y_min: y_min - padding * y_min,
        y_max: y_max + padding * y_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> BoundingBox {
        BoundingBox::new(x_min, x_max, y_min, y_max)
    }

    #[test]
    fn overlap_is_symmetric() {
        let boxes = [
            bx(0.0, 0.2, 0.0, 0.2),
            bx(0.1, 0.3, 0.1, 0.3),
            bx(0.5, 0.6, 0.5, 0.6),
            bx(0.21, 0.4, 0.0, 0.2),
            bx(0.05, 0.1, 0.05, 0.1),
        ];
        for a in &boxes {
            for b in &boxes {
                for t in [0.0, 0.07, 0.25, 0.5] {
                    assert_eq!(overlaps(a, b, t), overlaps(b, a, t));
                }
            }
        }
    }

    #[test]
    fn box_overlaps_itself() {
        let a = bx(0.1, 0.4, 0.2, 0.5);
        assert!(overlaps(&a, &a, 0.0));
        // Degenerate boxes still overlap themselves via containment.
        let point = bx(0.3, 0.3, 0.3, 0.3);
        assert!(overlaps(&point, &point, 0.0));
    }

    #[test]
    fn nested_box_overlaps_at_any_threshold() {
        let outer = bx(0.0, 1.0, 0.0, 1.0);
        let inner = bx(0.4, 0.41, 0.4, 0.41);
        for t in [0.0, 0.25, 0.5, 2.0] {
            assert!(overlaps(&outer, &inner, t));
        }
    }

    #[test]
    fn threshold_bridges_small_gaps() {
        let a = bx(0.0, 0.2, 0.0, 0.2);
        let b = bx(0.21, 0.41, 0.0, 0.2);
        assert!(!overlaps(&a, &b, 0.0));
        // 0.2 wide boxes expanded by 10% gain 0.02 per side.
        assert!(overlaps(&a, &b, 0.1));
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = bx(0.0, 0.2, 0.0, 0.2);
        let b = bx(0.2, 0.4, 0.0, 0.2);
        assert!(!overlaps(&a, &b, 0.0));
    }

    #[test]
    fn merge_without_padding_is_elementwise() {
        let a = bx(0.1, 0.3, 0.4, 0.6);
        let b = bx(0.2, 0.5, 0.1, 0.5);
        assert_eq!(merge(&a, &b, 0.0), bx(0.1, 0.5, 0.1, 0.6));
    }

    #[test]
    fn merge_padding_scales_with_coordinate_value() {
        let a = bx(0.2, 0.4, 0.5, 0.8);
        let b = bx(0.3, 0.6, 0.6, 0.9);
        let m = merge(&a, &b, 0.1);
        assert!((m.x_min - 0.18).abs() < 1e-12);
        assert!((m.x_max - 0.66).abs() < 1e-12);
        assert!((m.y_min - 0.45).abs() < 1e-12);
        assert!((m.y_max - 0.99).abs() < 1e-12);
    }

    #[test]
    fn absolute_conversion_truncates() {
        let b = bx(0.1, 0.5, 0.333, 0.999);
        let abs = b.to_absolute(641, 480);
        assert_eq!(
            abs,
            PixelBox {
                x_min: 64,
                x_max: 320,
                y_min: 159,
                y_max: 479
            }
        );
    }

    #[test]
    fn pixel_offset_translates_corners() {
        let local = PixelBox {
            x_min: 5,
            x_max: 10,
            y_min: 1,
            y_max: 2,
        };
        let origin = PixelBox {
            x_min: 100,
            x_max: 200,
            y_min: 50,
            y_max: 60,
        };
        let global = local.offset_by(&origin);
        assert_eq!(global.x_min, 105);
        assert_eq!(global.x_max, 110);
        assert_eq!(global.y_min, 51);
        assert_eq!(global.y_max, 52);
    }
}
