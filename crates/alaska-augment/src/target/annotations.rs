//! Bounding boxes and keypoints that travel with an image.
//!
//! # Coordinate System
//!
//! - Bounding boxes are normalized: `0.0` is the left/top edge, `1.0` the
//!   right/bottom edge of the image
//! - Keypoints are in pixel-index coordinates, so pixel `(x, y)` maps exactly
//!   like the pixel it labels (`cols - 1 - x` under a horizontal flip)
//! - Keypoint angles are in radians, measured from the +x axis towards +y,
//!   kept in `[0, 2π)`

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geometry::Descriptor;

/// Axis-aligned box in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Area in normalized units.
    pub fn area(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
    }

    /// Apply a dihedral transform of the whole image to the box.
    pub fn transform(&self, descriptor: Descriptor) -> Self {
        let Self {
            x_min,
            y_min,
            x_max,
            y_max,
        } = *self;

        match descriptor {
            Descriptor::Identity => *self,
            Descriptor::Rotate90(k) => match k.get() {
                1 => Self::new(y_min, 1.0 - x_max, y_max, 1.0 - x_min),
                2 => Self::new(1.0 - x_max, 1.0 - y_max, 1.0 - x_min, 1.0 - y_min),
                3 => Self::new(1.0 - y_max, x_min, 1.0 - y_min, x_max),
                _ => *self,
            },
            Descriptor::Transpose => Self::new(y_min, x_min, y_max, x_max),
            Descriptor::HorizontalFlip => Self::new(1.0 - x_max, y_min, 1.0 - x_min, y_max),
            Descriptor::VerticalFlip => Self::new(x_min, 1.0 - y_max, x_max, 1.0 - y_min),
        }
    }

    /// Re-express the box relative to a crop window of an image.
    ///
    /// The window is given in pixels on an image of `rows x cols`. The result
    /// is clipped to the window; `None` if nothing of the box remains.
    pub fn crop(&self, rows: usize, cols: usize, window: CropWindow) -> Option<Self> {
        let (rows, cols) = (rows as f32, cols as f32);
        let (top, left) = (window.top as f32, window.left as f32);
        let (h, w) = (window.height as f32, window.width as f32);

        let clipped = Self::new(
            ((self.x_min * cols - left) / w).clamp(0.0, 1.0),
            ((self.y_min * rows - top) / h).clamp(0.0, 1.0),
            ((self.x_max * cols - left) / w).clamp(0.0, 1.0),
            ((self.y_max * rows - top) / h).clamp(0.0, 1.0),
        );

        (clipped.area() > 0.0).then_some(clipped)
    }
}

/// A labelled point with an orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        Self {
            x,
            y,
            angle: normalize_angle(angle),
        }
    }

    /// Apply a dihedral transform of a `rows x cols` image to the point.
    pub fn transform(&self, descriptor: Descriptor, rows: usize, cols: usize) -> Self {
        let (x, y, a) = (self.x, self.y, self.angle);
        let (last_x, last_y) = (cols as f32 - 1.0, rows as f32 - 1.0);

        match descriptor {
            Descriptor::Identity => *self,
            Descriptor::Rotate90(k) => match k.get() {
                1 => Self::new(y, last_x - x, a - FRAC_PI_2),
                2 => Self::new(last_x - x, last_y - y, a - PI),
                3 => Self::new(last_y - y, x, a + FRAC_PI_2),
                _ => *self,
            },
            Descriptor::Transpose => Self::new(y, x, FRAC_PI_2 - a),
            Descriptor::HorizontalFlip => Self::new(last_x - x, y, PI - a),
            Descriptor::VerticalFlip => Self::new(x, last_y - y, -a),
        }
    }

    /// Shift into a crop window; `None` if the point falls outside it.
    pub fn crop(&self, window: CropWindow) -> Option<Self> {
        let x = self.x - window.left as f32;
        let y = self.y - window.top as f32;
        let inside = x >= 0.0 && y >= 0.0 && x < window.width as f32 && y < window.height as f32;
        inside.then(|| Self::new(x, y, self.angle))
    }

    /// Scale pixel coordinates, e.g. after resizing a crop to a new size.
    pub fn scale(&self, scale_x: f32, scale_y: f32) -> Self {
        Self::new(self.x * scale_x, self.y * scale_y, self.angle)
    }
}

/// Pixel rectangle selected by a crop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub top: usize,
    pub left: usize,
    pub height: usize,
    pub width: usize,
}

impl CropWindow {
    /// Whether the window is non-empty and lies inside a `rows x cols` grid.
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        let inside = |start: usize, len: usize, limit: usize| {
            len > 0 && start.checked_add(len).is_some_and(|end| end <= limit)
        };
        inside(self.top, self.height, rows) && inside(self.left, self.width, cols)
    }
}

fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn assert_bbox_close(a: BBox, b: BBox) {
        assert!(
            close(a.x_min, b.x_min)
                && close(a.y_min, b.y_min)
                && close(a.x_max, b.x_max)
                && close(a.y_max, b.y_max),
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_bbox_rot90() {
        let b = BBox::new(0.1, 0.2, 0.3, 0.5);
        assert_bbox_close(
            b.transform(Descriptor::rotate90(1).unwrap()),
            BBox::new(0.2, 0.7, 0.5, 0.9),
        );
        assert_bbox_close(
            b.transform(Descriptor::rotate90(2).unwrap()),
            BBox::new(0.7, 0.5, 0.9, 0.8),
        );
        assert_bbox_close(
            b.transform(Descriptor::rotate90(3).unwrap()),
            BBox::new(0.5, 0.1, 0.8, 0.3),
        );
    }

    #[test]
    fn test_bbox_four_rotations_identity() {
        let b = BBox::new(0.1, 0.2, 0.3, 0.5);
        let r = Descriptor::rotate90(1).unwrap();
        let back = b.transform(r).transform(r).transform(r).transform(r);
        assert_bbox_close(back, b);
    }

    #[test]
    fn test_bbox_transpose_and_flips() {
        let b = BBox::new(0.1, 0.2, 0.3, 0.5);
        assert_bbox_close(b.transform(Descriptor::Transpose), BBox::new(0.2, 0.1, 0.5, 0.3));
        assert_bbox_close(
            b.transform(Descriptor::HorizontalFlip),
            BBox::new(0.7, 0.2, 0.9, 0.5),
        );
        assert_bbox_close(
            b.transform(Descriptor::VerticalFlip),
            BBox::new(0.1, 0.5, 0.3, 0.8),
        );
    }

    #[test]
    fn test_bbox_crop() {
        let window = CropWindow {
            top: 0,
            left: 50,
            height: 100,
            width: 50,
        };
        // Box covering x 40..80 of a 100x100 image
        let b = BBox::new(0.4, 0.0, 0.8, 1.0);
        let cropped = b.crop(100, 100, window).unwrap();
        assert_bbox_close(cropped, BBox::new(0.0, 0.0, 0.6, 1.0));

        // Entirely left of the window
        assert!(BBox::new(0.0, 0.0, 0.4, 1.0).crop(100, 100, window).is_none());
    }

    #[test]
    fn test_keypoint_rot90_matches_pixels() {
        // Pixel (row 0, col 2) of a 2x3 image lands at (row 0, col 0)
        let p = Keypoint::new(2.0, 0.0, 0.0);
        let r = p.transform(Descriptor::rotate90(1).unwrap(), 2, 3);
        assert!(close(r.x, 0.0) && close(r.y, 0.0));
        assert!(close(r.angle, 3.0 * FRAC_PI_2));

        // Pixel (row 1, col 0) of a 2x3 image lands at (row 2, col 1) under k = 1
        let p = Keypoint::new(0.0, 1.0, 0.0);
        let r = p.transform(Descriptor::rotate90(1).unwrap(), 2, 3);
        assert!(close(r.x, 1.0) && close(r.y, 2.0));
    }

    #[test]
    fn test_keypoint_transpose_and_flips() {
        let p = Keypoint::new(1.0, 3.0, 0.25);
        let t = p.transform(Descriptor::Transpose, 4, 6);
        assert!(close(t.x, 3.0) && close(t.y, 1.0));
        assert!(close(t.angle, FRAC_PI_2 - 0.25));

        let h = p.transform(Descriptor::HorizontalFlip, 4, 6);
        assert!(close(h.x, 4.0) && close(h.y, 3.0));

        let v = p.transform(Descriptor::VerticalFlip, 4, 6);
        assert!(close(v.x, 1.0) && close(v.y, 0.0));
        assert!(close(v.angle, TAU - 0.25));
    }

    #[test]
    fn test_keypoint_crop() {
        let window = CropWindow {
            top: 8,
            left: 16,
            height: 8,
            width: 8,
        };
        let inside = Keypoint::new(20.0, 10.0, 0.0).crop(window).unwrap();
        assert!(close(inside.x, 4.0) && close(inside.y, 2.0));

        assert!(Keypoint::new(24.0, 10.0, 0.0).crop(window).is_none());
    }

    #[test]
    fn test_angle_normalization() {
        assert!(close(Keypoint::new(0.0, 0.0, -FRAC_PI_2).angle, 3.0 * FRAC_PI_2));
        assert!(close(Keypoint::new(0.0, 0.0, TAU + 0.5).angle, 0.5));
    }
}
