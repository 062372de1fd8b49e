//! Box rasterization and overlap.
//!
//! Boxes live on a square `feature_size × feature_size` grid. Overlap is
//! measured by rasterizing each box into an occupancy mask and counting
//! cells, which also gives a well-defined IoU for unions of boxes (a union of
//! two boxes is generally not a box).

use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer grid coordinates, half-open on both axes.
///
/// Serialized as `[x_min, x_max, y_min, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl BBox {
    pub const fn new(x_min: i32, x_max: i32, y_min: i32, y_max: i32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x_min, b.x_max, b.y_min, b.y_max]
    }
}

/// Clamp a half-open coordinate range onto `[0, size]`.
fn clamp_span(lo: i32, hi: i32, size: usize) -> (usize, usize) {
    let clamp = |v: i32| v.clamp(0, size as i32) as usize;
    let (lo, hi) = (clamp(lo), clamp(hi));
    (lo, hi.max(lo))
}

/// Boolean occupancy grid for one box or a union of boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxMask {
    cells: Array2<bool>,
}

impl BoxMask {
    /// All-false mask.
    pub fn empty(feature_size: usize) -> Self {
        Self {
            cells: Array2::from_elem((feature_size, feature_size), false),
        }
    }

    /// Rasterize `bbox`: rows `y_min..y_max`, columns `x_min..x_max`.
    ///
    /// Coordinates outside the grid are clamped; a box with `min >= max` on
    /// either axis leaves the mask empty.
    pub fn from_box(bbox: &BBox, feature_size: usize) -> Self {
        let mut mask = Self::empty(feature_size);
        let (y0, y1) = clamp_span(bbox.y_min, bbox.y_max, feature_size);
        let (x0, x1) = clamp_span(bbox.x_min, bbox.x_max, feature_size);
        mask.cells.slice_mut(s![y0..y1, x0..x1]).fill(true);
        mask
    }

    /// Cell-wise OR of two masks of the same size.
    pub fn union(&self, other: &BoxMask) -> BoxMask {
        let mut cells = self.cells.clone();
        Zip::from(&mut cells)
            .and(&other.cells)
            .for_each(|a, &b| *a |= b);
        BoxMask { cells }
    }

    /// Number of occupied cells.
    pub fn area(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Intersection-over-union with `other`.
    ///
    /// Returns exactly `0.0` when both masks are empty.
    pub fn iou(&self, other: &BoxMask) -> f32 {
        let (intersect, union) = Zip::from(&self.cells).and(&other.cells).fold(
            (0usize, 0usize),
            |(i, u), &a, &b| (i + usize::from(a && b), u + usize::from(a || b)),
        );
        if union == 0 {
            0.0
        } else {
            intersect as f32 / union as f32
        }
    }
}

/// IoU of two boxes rasterized on a `feature_size` grid.
pub fn iou(a: &BBox, b: &BBox, feature_size: usize) -> f32 {
    BoxMask::from_box(a, feature_size).iou(&BoxMask::from_box(b, feature_size))
}

/// IoU of the predicted subject∪object region against the target one.
pub fn union_iou(
    pred_subject: &BBox,
    pred_object: &BBox,
    target_subject: &BBox,
    target_object: &BBox,
    feature_size: usize,
) -> f32 {
    let pred = BoxMask::from_box(pred_subject, feature_size)
        .union(&BoxMask::from_box(pred_object, feature_size));
    let target = BoxMask::from_box(target_subject, feature_size)
        .union(&BoxMask::from_box(target_object, feature_size));
    pred.iou(&target)
}
