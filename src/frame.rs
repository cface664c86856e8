//! Frame containers and per-frame preprocessing.
//!
//! - `Frame`: immutable RGB8 image. Workers share it as `SharedFrame` (an `Arc`),
//!   so one capture can be fanned out without copying.
//! - `GrayFrame`: single-channel luma image, the input to motion oracles.
//! - `Preprocessor`: downscale + gamma correction applied before detection.
//!
//! Pixel storage and resampling come from the `image` crate; this module only
//! adds the validation and the sentinel's preprocessing policy on top.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use std::sync::Arc;

use crate::geometry::Rect;

/// Frame handed to every worker for the same tick.
pub type SharedFrame = Arc<Frame>;

// ----------------------------------------------------------------------------
// Frame: RGB8 image
// ----------------------------------------------------------------------------

/// RGB8 image, row-major, 3 bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Self::from_image(image)
    }

    /// Wrap a decoded image. Empty images are rejected.
    pub fn from_image(image: RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!(
                "frame must not be empty ({}x{})",
                image.width(),
                image.height()
            ));
        }
        Ok(Self::wrap(image))
    }

    /// Uniformly coloured frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        rgb_len(width, height)?;
        Self::from_image(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    // Callers guarantee a non-empty image.
    pub(crate) fn wrap(image: RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            image,
        }
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    /// Luma conversion as implemented by `image` (Rec. 709 weights).
    pub fn to_gray(&self) -> GrayFrame {
        GrayFrame::wrap(imageops::grayscale(&self.image))
    }

    /// Nearest-neighbour resize by `scale` (0 < scale <= 1).
    pub fn downscale(&self, scale: f64) -> Frame {
        if (scale - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let width = ((self.width as f64 * scale).round() as u32).max(1);
        let height = ((self.height as f64 * scale).round() as u32).max(1);
        Frame::wrap(imageops::resize(
            &self.image,
            width,
            height,
            FilterType::Nearest,
        ))
    }

    /// Copy out the region covered by `rect`, clamped to the frame.
    pub fn crop(&self, rect: &Rect) -> Result<Frame> {
        let r = rect.clamp_to(self.width, self.height);
        if r.width() == 0 || r.height() == 0 {
            return Err(anyhow!("crop region {:?} is empty", rect));
        }
        let region = imageops::crop_imm(
            &self.image,
            r.xmin as u32,
            r.ymin as u32,
            r.width(),
            r.height(),
        );
        Ok(Frame::wrap(region.to_image()))
    }

    fn map_channels(&self, table: &[u8; 256]) -> Frame {
        let mut image = self.image.clone();
        for value in image.iter_mut() {
            *value = table[*value as usize];
        }
        Frame::wrap(image)
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// GrayFrame
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    image: GrayImage,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} luma bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = GrayImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("luma buffer does not fit {}x{}", width, height))?;
        Ok(Self::wrap(image))
    }

    fn wrap(image: GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            image,
        }
    }

    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

// ----------------------------------------------------------------------------
// Preprocessing
// ----------------------------------------------------------------------------

/// Gamma correction lookup table over the 256 channel values.
#[derive(Clone, Debug)]
pub struct GammaTable {
    table: [u8; 256],
}

impl GammaTable {
    pub fn new(gamma: f64) -> Self {
        let inv = 1.0 / gamma;
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = ((i as f64 / 255.0).powf(inv) * 255.0) as u8;
        }
        Self { table }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        frame.map_channels(&self.table)
    }

    pub fn lookup(&self, value: u8) -> u8 {
        self.table[value as usize]
    }
}

/// Downscale then brighten, producing the frame detectors and the motion
/// oracle operate on.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    scale: f64,
    gamma: Option<GammaTable>,
}

impl Preprocessor {
    pub fn new(scale: f64, gamma: f64) -> Self {
        let gamma = if (gamma - 1.0).abs() < f64::EPSILON {
            None
        } else {
            Some(GammaTable::new(gamma))
        };
        Self { scale, gamma }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let scaled = frame.downscale(self.scale);
        match &self.gamma {
            Some(table) => table.apply(&scaled),
            None => scaled,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x + y) as u8]);
            }
        }
        Frame::new(data, width, height).unwrap()
    }

    fn split(width: u32, height: u32, left: [u8; 3], right: [u8; 3]) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb(left)
            } else {
                Rgb(right)
            }
        });
        Frame::from_image(image).unwrap()
    }

    #[test]
    fn frame_rejects_wrong_buffer_length() {
        assert!(Frame::new(vec![0u8; 10], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 13], 2, 2).is_err());
        assert!(Frame::new(vec![], 0, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_image(RgbImage::new(0, 4)).is_err());
    }

    #[test]
    fn gray_conversion_uses_luma_weights() {
        let white = Frame::filled(2, 2, [255, 255, 255]).unwrap().to_gray();
        assert!(white.pixels().iter().all(|&v| v == 255));

        let black = Frame::filled(1, 1, [0, 0, 0]).unwrap().to_gray();
        assert_eq!(black.luma(0, 0), 0);

        let red = Frame::filled(1, 1, [255, 0, 0]).unwrap().to_gray();
        let green = Frame::filled(1, 1, [0, 255, 0]).unwrap().to_gray();
        let blue = Frame::filled(1, 1, [0, 0, 255]).unwrap().to_gray();
        assert!(green.luma(0, 0) > red.luma(0, 0));
        assert!(red.luma(0, 0) > blue.luma(0, 0));
    }

    #[test]
    fn downscale_rounds_dimensions() {
        let frame = split(100, 50, [255, 0, 0], [0, 0, 255]);
        let small = frame.downscale(0.3);
        assert_eq!((small.width, small.height), (30, 15));
        assert_eq!(small.pixels().len(), 30 * 15 * 3);
        assert_eq!(small.pixel(0, 0), [255, 0, 0]);
        assert_eq!(small.pixel(29, 14), [0, 0, 255]);

        let same = frame.downscale(1.0);
        assert_eq!(same, frame);
    }

    #[test]
    fn tiny_scale_keeps_one_pixel() {
        let small = gradient(4, 4).downscale(0.01);
        assert_eq!((small.width, small.height), (1, 1));
    }

    #[test]
    fn gamma_of_one_is_identity() {
        let table = GammaTable::new(1.0);
        for v in 0..=255u8 {
            assert_eq!(table.lookup(v), v);
        }
    }

    #[test]
    fn gamma_above_one_brightens() {
        let table = GammaTable::new(2.0);
        assert_eq!(table.lookup(0), 0);
        assert_eq!(table.lookup(255), 255);
        assert!(table.lookup(64) > 64);
    }

    #[test]
    fn crop_copies_region() {
        let frame = gradient(10, 10);
        let rect = Rect::new(2, 3, 5, 6).unwrap();
        let crop = frame.crop(&rect).unwrap();
        assert_eq!((crop.width, crop.height), (3, 3));
        assert_eq!(crop.pixel(0, 0), frame.pixel(2, 3));
        assert_eq!(crop.pixel(2, 2), frame.pixel(4, 5));

        let empty = Rect::new(4, 4, 4, 8).unwrap();
        assert!(frame.crop(&empty).is_err());
    }

    #[test]
    fn crop_clamps_overhanging_region() {
        let frame = gradient(10, 10);
        let crop = frame.crop(&Rect::new(-5, 8, 3, 40).unwrap()).unwrap();
        assert_eq!((crop.width, crop.height), (3, 2));
        assert_eq!(crop.pixel(0, 0), frame.pixel(0, 8));
    }

    #[test]
    fn preprocessor_scales_then_corrects() {
        let frame = Frame::filled(10, 10, [64, 64, 64]).unwrap();
        let out = Preprocessor::new(0.5, 2.0).apply(&frame);
        assert_eq!((out.width, out.height), (5, 5));
        assert_eq!(out.pixel(0, 0), [127, 127, 127]);
    }
}
