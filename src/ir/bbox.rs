//! Bounding box representations and the pure conversions between them.
//!
//! - [`BBoxXYXY`]: absolute corners, the Pascal VOC form.
//! - [`BBoxXYWH`]: absolute top-left plus size, the COCO form and the one
//!   stored on [`Annotation`](super::Annotation).
//! - [`BBoxXYWHN`]: center plus size divided by the image dimensions, the
//!   YOLO form.
//!
//! None of the constructors enforce positive extents. Degenerate boxes are
//! representable so historical datasets pass through untouched; callers
//! that want stricter behaviour opt in through [`BoxPolicy`].

use serde::{Deserialize, Serialize};

/// Absolute corner box `(xmin, ymin, xmax, ymax)` in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBoxXYXY {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// Absolute top-left + size box `(x, y, w, h)` in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBoxXYWH {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Normalized center + size box `(xc, yc, wn, hn)`.
///
/// Every component is a fraction of the image width (x terms) or height
/// (y terms).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBoxXYWHN {
    pub xc: f64,
    pub yc: f64,
    pub wn: f64,
    pub hn: f64,
}

impl BBoxXYXY {
    #[inline]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    #[inline]
    pub fn to_xywh(&self) -> BBoxXYWH {
        BBoxXYWH::new(
            self.xmin,
            self.ymin,
            self.xmax - self.xmin,
            self.ymax - self.ymin,
        )
    }

    /// Converts to the normalized center form for an image of the given size.
    pub fn to_xywhn(&self, image_width: f64, image_height: f64) -> BBoxXYWHN {
        let w = self.xmax - self.xmin;
        let h = self.ymax - self.ymin;
        BBoxXYWHN::new(
            (self.xmin + w / 2.0) / image_width,
            (self.ymin + h / 2.0) / image_height,
            w / image_width,
            h / image_height,
        )
    }

    /// Integer corners as written to VOC XML.
    pub fn to_pixels(&self, rounding: PixelRounding) -> [i64; 4] {
        [
            rounding.apply(self.xmin),
            rounding.apply(self.ymin),
            rounding.apply(self.xmax),
            rounding.apply(self.ymax),
        ]
    }
}

impl BBoxXYWH {
    #[inline]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub fn to_xyxy(&self) -> BBoxXYXY {
        BBoxXYXY::new(self.x, self.y, self.x + self.w, self.y + self.h)
    }

    pub fn to_xywhn(&self, image_width: f64, image_height: f64) -> BBoxXYWHN {
        BBoxXYWHN::new(
            (self.x + self.w / 2.0) / image_width,
            (self.y + self.h / 2.0) / image_height,
            self.w / image_width,
            self.h / image_height,
        )
    }

    /// `w * h`. Negative or zero for degenerate boxes.
    #[inline]
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// True when the box has no positive extent on some axis, or holds a
    /// non-finite value.
    pub fn is_degenerate(&self) -> bool {
        !(self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite())
            || self.w <= 0.0
            || self.h <= 0.0
    }

    /// Integer `[x, y, w, h]` as written to COCO JSON.
    ///
    /// Each component is rounded on its own, so `x + w` may differ by one
    /// pixel from the rounded right edge of the same box in VOC output.
    pub fn to_pixels(&self, rounding: PixelRounding) -> [i64; 4] {
        [
            rounding.apply(self.x),
            rounding.apply(self.y),
            rounding.apply(self.w),
            rounding.apply(self.h),
        ]
    }
}

impl BBoxXYWHN {
    #[inline]
    pub fn new(xc: f64, yc: f64, wn: f64, hn: f64) -> Self {
        Self { xc, yc, wn, hn }
    }

    pub fn to_xyxy(&self, image_width: f64, image_height: f64) -> BBoxXYXY {
        BBoxXYXY::new(
            (self.xc - self.wn / 2.0) * image_width,
            (self.yc - self.hn / 2.0) * image_height,
            (self.xc + self.wn / 2.0) * image_width,
            (self.yc + self.hn / 2.0) * image_height,
        )
    }

    pub fn to_xywh(&self, image_width: f64, image_height: f64) -> BBoxXYWH {
        BBoxXYWH::new(
            (self.xc - self.wn / 2.0) * image_width,
            (self.yc - self.hn / 2.0) * image_height,
            self.wn * image_width,
            self.hn * image_height,
        )
    }
}

/// How absolute pixel values become integers when serialised.
///
/// `Truncate` (toward zero) reproduces what the legacy converters wrote for
/// COCO. `Round` is closer to the true value, but output then differs from
/// historical files by up to one pixel per coordinate.
///
/// VOC corners are rounded from the float right and bottom edges, so with
/// `Truncate` a box at `x = 10.7, w = 30.9` gets `xmax = 41`. The legacy
/// writer summed the truncated parts and wrote 40. Both stay within a pixel
/// of the true edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelRounding {
    #[default]
    Truncate,
    Round,
}

impl PixelRounding {
    #[inline]
    pub fn apply(self, value: f64) -> i64 {
        match self {
            PixelRounding::Truncate => value.trunc() as i64,
            PixelRounding::Round => value.round() as i64,
        }
    }
}

/// Treatment of degenerate boxes (`w <= 0` or `h <= 0`) while reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoxPolicy {
    /// Keep every box exactly as read.
    #[default]
    Passthrough,
    /// Fail the read on the first degenerate box.
    Reject,
    /// Clip boxes to the image bounds and drop those left without area.
    Clamp,
}

impl BoxPolicy {
    /// Applies the policy to one box on an image of the given size.
    ///
    /// Returns `Ok(None)` when the box should be dropped, and `Err` with a
    /// description when the policy rejects it.
    pub fn apply(
        self,
        bbox: BBoxXYWH,
        image_width: u32,
        image_height: u32,
    ) -> Result<Option<BBoxXYWH>, String> {
        match self {
            BoxPolicy::Passthrough => Ok(Some(bbox)),
            BoxPolicy::Reject => {
                if bbox.is_degenerate() {
                    Err(format!(
                        "degenerate box [x={}, y={}, w={}, h={}]",
                        bbox.x, bbox.y, bbox.w, bbox.h
                    ))
                } else {
                    Ok(Some(bbox))
                }
            }
            BoxPolicy::Clamp => {
                let width = f64::from(image_width);
                let height = f64::from(image_height);
                let corners = bbox.to_xyxy();
                let clipped = BBoxXYXY::new(
                    corners.xmin.clamp(0.0, width),
                    corners.ymin.clamp(0.0, height),
                    corners.xmax.clamp(0.0, width),
                    corners.ymax.clamp(0.0, height),
                )
                .to_xywh();
                if clipped.is_degenerate() {
                    Ok(None)
                } else {
                    Ok(Some(clipped))
                }
            }
        }
    }
}
