use serde::{Deserialize, Serialize};

use crate::geometry::PixelBox;

/// One detection in absolute pixel coordinates of the image it was run on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
}

impl Detection {
    pub fn bounds(&self) -> PixelBox {
        PixelBox {
            x_min: self.x_min,
            x_max: self.x_max,
            y_min: self.y_min,
            y_max: self.y_max,
        }
    }

    /// Exact class match at or above the confidence threshold.
    pub fn matches(&self, class_name: &str, min_confidence: f64) -> bool {
        self.class_name == class_name && self.confidence >= min_confidence
    }
}

/// One ranked classification label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class_name: String,
    pub confidence: f64,
}

impl Classification {
    pub fn matches(&self, class_name: &str, min_confidence: f64) -> bool {
        self.class_name == class_name && self.confidence >= min_confidence
    }
}
