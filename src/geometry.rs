//! Rectangle geometry for correlating detections.
//!
//! Detectors report boxes as fractions of the frame. They are converted once,
//! at ingestion, into pixel-space `Rect`s for the frame they belong to. Every
//! correlation test downstream works on `Rect`.

use anyhow::{anyhow, Result};

/// Axis-aligned rectangle in pixel coordinates of a single frame.
///
/// `xmin <= xmax` and `ymin <= ymax` always hold. Zero-area rectangles are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Rect {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Result<Self> {
        if xmin > xmax || ymin > ymax {
            return Err(anyhow!(
                "inverted rectangle ({}, {}, {}, {})",
                xmin,
                ymin,
                xmax,
                ymax
            ));
        }
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    pub fn width(&self) -> u32 {
        self.xmax.abs_diff(self.xmin)
    }

    pub fn height(&self) -> u32 {
        self.ymax.abs_diff(self.ymin)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Top half of the rectangle (head and torso for a standing person).
    pub fn upper_half(&self) -> Rect {
        let half = i64::from(self.height() / 2);
        Rect {
            xmin: self.xmin,
            ymin: self.ymin,
            xmax: self.xmax,
            ymax: (i64::from(self.ymin) + half) as i32,
        }
    }

    /// Clamp into a `width x height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let w = i32::try_from(width).unwrap_or(i32::MAX);
        let h = i32::try_from(height).unwrap_or(i32::MAX);
        Rect {
            xmin: self.xmin.clamp(0, w),
            ymin: self.ymin.clamp(0, h),
            xmax: self.xmax.clamp(0, w),
            ymax: self.ymax.clamp(0, h),
        }
    }
}

/// Closed-interval intersection test.
///
/// Rectangles that only share an edge (or a corner) intersect.
pub fn intersects(a: &Rect, b: &Rect) -> bool {
    if a.xmin > b.xmax || a.xmax < b.xmin {
        return false;
    }
    if a.ymin > b.ymax || a.ymax < b.ymin {
        return false;
    }
    true
}

/// Detector box, normalized to fractions of frame width/height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl NormalizedBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from the `[ymin, xmin, ymax, xmax]` layout SSD-style detectors emit.
    pub fn from_yxyx(coords: [f32; 4]) -> Self {
        Self {
            xmin: coords[1],
            ymin: coords[0],
            xmax: coords[3],
            ymax: coords[2],
        }
    }

    /// Convert into pixel space for a `width x height` frame.
    ///
    /// Non-finite and inverted boxes are rejected. Coordinates overhanging the
    /// frame are clamped to `[0, 1]`, which preserves ordering.
    pub fn to_rect(&self, width: u32, height: u32) -> Result<Rect> {
        let coords = [self.xmin, self.ymin, self.xmax, self.ymax];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(anyhow!("non-finite box coordinates {:?}", coords));
        }
        if self.xmin > self.xmax || self.ymin > self.ymax {
            return Err(anyhow!("inverted box {:?}", coords));
        }
        let px = |frac: f32, dim: u32| (frac.clamp(0.0, 1.0) as f64 * dim as f64) as i32;
        Rect::new(
            px(self.xmin, width),
            px(self.ymin, height),
            px(self.xmax, width),
            px(self.ymax, height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Rect {
        Rect::new(xmin, ymin, xmax, ymax).unwrap()
    }

    #[test]
    fn touching_edges_intersect() {
        let a = rect(0, 0, 10, 10);
        let b = rect(10, 0, 20, 10);
        assert!(intersects(&a, &b));
        assert!(intersects(&b, &a));

        let corner = rect(10, 10, 15, 15);
        assert!(intersects(&a, &corner));
    }

    #[test]
    fn disjoint_rectangles_do_not_intersect() {
        let a = rect(0, 0, 10, 10);
        assert!(!intersects(&a, &rect(11, 0, 20, 10)));
        assert!(!intersects(&a, &rect(0, 11, 10, 20)));
        assert!(!intersects(&a, &rect(-20, -20, -1, -1)));
    }

    #[test]
    fn intersection_is_symmetric() {
        let rects = [
            rect(0, 0, 10, 10),
            rect(5, 5, 15, 15),
            rect(10, 0, 20, 10),
            rect(11, 11, 30, 30),
            rect(3, 3, 3, 3),
            rect(-5, 2, 0, 4),
            rect(0, 20, 100, 20),
        ];
        for a in &rects {
            for b in &rects {
                assert_eq!(intersects(a, b), intersects(b, a), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn degenerate_rectangles_are_legal() {
        let point = rect(5, 5, 5, 5);
        assert_eq!(point.area(), 0);
        assert!(intersects(&point, &rect(0, 0, 10, 10)));
        assert!(intersects(&point, &point));
        assert!(!intersects(&point, &rect(6, 6, 8, 8)));
    }

    #[test]
    fn inverted_rect_is_rejected() {
        assert!(Rect::new(10, 0, 5, 10).is_err());
        assert!(Rect::new(0, 10, 5, 5).is_err());
    }

    #[test]
    fn normalized_box_converts_to_pixels() {
        let human = NormalizedBox::new(0.0, 0.0, 0.5, 1.0);
        assert_eq!(human.to_rect(200, 200).unwrap(), rect(0, 0, 100, 200));

        let yxyx = NormalizedBox::from_yxyx([0.1, 0.2, 0.3, 0.4]);
        assert_eq!(yxyx, NormalizedBox::new(0.2, 0.1, 0.4, 0.3));
    }

    #[test]
    fn normalized_box_rejects_malformed_input() {
        assert!(NormalizedBox::new(0.6, 0.0, 0.5, 1.0).to_rect(100, 100).is_err());
        assert!(NormalizedBox::new(f32::NAN, 0.0, 0.5, 1.0)
            .to_rect(100, 100)
            .is_err());
    }

    #[test]
    fn overhanging_box_is_clamped_to_frame() {
        let b = NormalizedBox::new(-0.1, 0.5, 1.2, 1.0);
        assert_eq!(b.to_rect(100, 50).unwrap(), rect(0, 25, 100, 50));
    }

    #[test]
    fn upper_half_keeps_top_edge() {
        let r = rect(10, 20, 30, 61);
        assert_eq!(r.upper_half(), rect(10, 20, 30, 40));
    }

    #[test]
    fn full_range_rect_measures_without_overflow() {
        let widest = rect(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(widest.width(), u32::MAX);
        assert_eq!(widest.height(), u32::MAX);
        assert_eq!(widest.area(), u32::MAX as u64 * u32::MAX as u64);
        assert_eq!(widest.upper_half().ymax, -1);

        let r = rect(0, 0, i32::MAX, i32::MAX);
        assert_eq!(r.width(), i32::MAX as u32);
        assert_eq!(r.clamp_to(640, 480), rect(0, 0, 640, 480));
    }
}
