//! Debug overlay for processed frames.
//!
//! Draws person boxes, weapon boxes and a sparse sample of the motion field
//! onto a copy of the preprocessed frame. The overlay is for humans watching
//! the feed; nothing in the engine reads it back.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};

use crate::frame::Frame;
use crate::geometry::Rect;
use crate::motion::MotionField;

pub const HUMAN_COLOR: [u8; 3] = [255, 255, 0];
pub const WEAPON_COLOR: [u8; 3] = [255, 0, 0];
pub const FLOW_COLOR: [u8; 3] = [0, 255, 0];

/// Pixel spacing between drawn flow vectors.
pub const FLOW_STEP: i32 = 8;

pub struct Annotator {
    canvas: RgbImage,
}

impl Annotator {
    pub fn new(frame: &Frame) -> Self {
        Self {
            canvas: frame.as_image().clone(),
        }
    }

    /// Outline `rect` (inclusive corners), `thickness` pixels deep. Parts
    /// outside the canvas are drawn along its border.
    pub fn rect(&mut self, rect: &Rect, color: [u8; 3], thickness: i32) {
        let r = rect.clamp_to(self.canvas.width() - 1, self.canvas.height() - 1);
        for t in 0..thickness.max(1) {
            let (x0, y0, x1, y1) = (r.xmin + t, r.ymin + t, r.xmax - t, r.ymax - t);
            if x0 > x1 || y0 > y1 {
                break;
            }
            let outline = imageproc::rect::Rect::at(x0, y0)
                .of_size((x1 - x0) as u32 + 1, (y1 - y0) as u32 + 1);
            draw_hollow_rect_mut(&mut self.canvas, outline, Rgb(color));
        }
    }

    /// Draw roughly one flow vector per `FLOW_STEP` pixels, starting half a step in.
    pub fn flow(&mut self, field: &MotionField) {
        let every = (FLOW_STEP / field.stride() as i32).max(1) as u32;
        let offset = every / 2;
        let reach = (self.canvas.width() + self.canvas.height()) as f32;
        for (x, y, v) in field.samples() {
            let col = x as u32 / field.stride();
            let row = y as u32 / field.stride();
            if col % every != offset || row % every != offset {
                continue;
            }
            let x1 = x as f32 + (v.dx.clamp(-reach, reach) + 0.5).floor();
            let y1 = y as f32 + (v.dy.clamp(-reach, reach) + 0.5).floor();
            draw_line_segment_mut(
                &mut self.canvas,
                (x as f32, y as f32),
                (x1, y1),
                Rgb(FLOW_COLOR),
            );
            draw_filled_circle_mut(&mut self.canvas, (x, y), 1, Rgb(FLOW_COLOR));
        }
    }

    pub fn finish(self) -> Frame {
        Frame::wrap(self.canvas)
    }
}
