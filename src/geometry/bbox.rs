use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::features::{get_box_sizes, BoxSizes};

/// Box given by its corners, `x2`/`y2` exclusive.
/// Coordinates are signed so an extended box may leave the image before clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl BoundingBox {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    pub fn sizes(&self) -> BoxSizes {
        get_box_sizes(self.x1, self.y1, self.x2, self.y2)
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn clip(&self, img_width: u32, img_height: u32) -> BoundingBox {
        let (w, h) = (img_width as i64, img_height as i64);
        BoundingBox {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Intersection over union, 0 for boxes without area.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let b1_area = (self.width().max(0) * self.height().max(0)) as f32;
        let b2_area = (other.width().max(0) * other.height().max(0)) as f32;
        let i_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0);
        let i_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0);
        let i_area = (i_w * i_h) as f32;
        let union = b1_area + b2_area - i_area;
        if union > 0. {
            i_area / union
        } else {
            0.
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Margins in pixels added around the lung box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LungExtension {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl LungExtension {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> LungExtension {
        LungExtension {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl Default for LungExtension {
    fn default() -> Self {
        LungExtension::new(50, 50, 50, 150)
    }
}

/// Problem found in an extended box before it is clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxViolation {
    Left { x1: i64 },
    Top { y1: i64 },
    Right { x2: i64, img_width: i64 },
    Bottom { y2: i64, img_height: i64 },
    CollapsedX { x1: i64, x2: i64 },
    CollapsedY { y1: i64, y2: i64 },
}

impl fmt::Display for BoxViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxViolation::Left { x1 } => {
                write!(f, "x1 = {} exceeds the left edge of the image = 0", x1)
            }
            BoxViolation::Top { y1 } => {
                write!(f, "y1 = {} exceeds the top edge of the image = 0", y1)
            }
            BoxViolation::Right { x2, img_width } => write!(
                f,
                "x2 = {} exceeds the right edge of the image = {}",
                x2, img_width
            ),
            BoxViolation::Bottom { y2, img_height } => write!(
                f,
                "y2 = {} exceeds the bottom edge of the image = {}",
                y2, img_height
            ),
            BoxViolation::CollapsedX { x1, x2 } => {
                write!(f, "x2 = {} is not greater than x1 = {}", x2, x1)
            }
            BoxViolation::CollapsedY { y1, y2 } => {
                write!(f, "y2 = {} is not greater than y1 = {}", y2, y1)
            }
        }
    }
}

/// Clipped box together with everything that was wrong with the extended one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedLungBox {
    pub bbox: BoundingBox,
    pub violations: Vec<BoxViolation>,
}

/// Extends the lung box by `lung_extension`, reports every edge that leaves the
/// image or a collapsed box, then clips to `[0, img_width] x [0, img_height]`.
///
/// Violations are checked on the extended box, before clipping, so that
/// requests outside the image always show up in the logs.
pub fn modify_lung_box(
    img_height: u32,
    img_width: u32,
    lung_coords: BoundingBox,
    lung_extension: LungExtension,
) -> ModifiedLungBox {
    let (img_width, img_height) = (img_width as i64, img_height as i64);
    let extended = BoundingBox {
        x1: lung_coords.x1 - lung_extension.left,
        y1: lung_coords.y1 - lung_extension.top,
        x2: lung_coords.x2 + lung_extension.right,
        y2: lung_coords.y2 + lung_extension.bottom,
    };

    let mut violations = vec![];
    if extended.x1 < 0 {
        violations.push(BoxViolation::Left { x1: extended.x1 });
    }
    if extended.y1 < 0 {
        violations.push(BoxViolation::Top { y1: extended.y1 });
    }
    if extended.x2 > img_width {
        violations.push(BoxViolation::Right {
            x2: extended.x2,
            img_width,
        });
    }
    if extended.y2 > img_height {
        violations.push(BoxViolation::Bottom {
            y2: extended.y2,
            img_height,
        });
    }
    if extended.x2 <= extended.x1 {
        violations.push(BoxViolation::CollapsedX {
            x1: extended.x1,
            x2: extended.x2,
        });
    }
    if extended.y2 <= extended.y1 {
        violations.push(BoxViolation::CollapsedY {
            y1: extended.y1,
            y2: extended.y2,
        });
    }
    for violation in &violations {
        warn!("{}", violation);
    }

    ModifiedLungBox {
        bbox: extended.clip(img_width as u32, img_height as u32),
        violations,
    }
}
