//! Motion fields and region summaries.
//!
//! A `MotionField` is produced once per frame by a `MotionOracle` from the
//! previous and current grayscale frames. The engine only ever reduces it to a
//! scalar per human region.

use anyhow::{anyhow, Result};

use crate::frame::GrayFrame;
use crate::geometry::Rect;

/// Per-cell flow vector in pixels per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowVector {
    pub dx: f32,
    pub dy: f32,
}

impl FlowVector {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn magnitude(&self) -> f64 {
        let dx = self.dx as f64;
        let dy = self.dy as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Flow vectors sampled on a regular grid.
///
/// Cell `(row, col)` sits at pixel `(col * stride, row * stride)`.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionField {
    cells: Vec<FlowVector>,
    rows: u32,
    cols: u32,
    stride: u32,
}

impl MotionField {
    pub fn new(cells: Vec<FlowVector>, rows: u32, cols: u32, stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(anyhow!("motion field stride must be > 0"));
        }
        if cells.len() != rows as usize * cols as usize {
            return Err(anyhow!(
                "motion field expects {}x{} cells, received {}",
                rows,
                cols,
                cells.len()
            ));
        }
        Ok(Self {
            cells,
            rows,
            cols,
            stride,
        })
    }

    /// Field covering a `width x height` frame with the same vector everywhere.
    pub fn uniform(width: u32, height: u32, stride: u32, vector: FlowVector) -> Result<Self> {
        let (rows, cols) = grid_dims(width, height, stride)?;
        Self::new(
            vec![vector; rows as usize * cols as usize],
            rows,
            cols,
            stride,
        )
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn cell(&self, row: u32, col: u32) -> FlowVector {
        self.cells[row as usize * self.cols as usize + col as usize]
    }

    /// Iterate `(x, y, vector)` for every sampled cell.
    pub fn samples(&self) -> impl Iterator<Item = (i32, i32, FlowVector)> + '_ {
        let stride = self.stride as i32;
        let cols = self.cols as usize;
        self.cells.iter().enumerate().map(move |(i, v)| {
            let x = (i % cols) as i32 * stride;
            let y = (i / cols) as i32 * stride;
            (x, y, *v)
        })
    }
}

fn grid_dims(width: u32, height: u32, stride: u32) -> Result<(u32, u32)> {
    if stride == 0 {
        return Err(anyhow!("motion field stride must be > 0"));
    }
    Ok((height.div_ceil(stride), width.div_ceil(stride)))
}

/// Mean flow magnitude over the sampled cells inside `region`.
///
/// Cells are inside when `xmin <= x < xmax` and `ymin <= y < ymax`. Returns
/// `0.0` when no cell falls inside or the mean is not finite.
pub fn region_motion_magnitude(flow: &MotionField, region: &Rect) -> f64 {
    let stride = flow.stride as i32;
    let col_start = div_ceil_nonneg(region.xmin, stride);
    let col_end = div_ceil_nonneg(region.xmax, stride).min(flow.cols as i32);
    let row_start = div_ceil_nonneg(region.ymin, stride);
    let row_end = div_ceil_nonneg(region.ymax, stride).min(flow.rows as i32);

    let mut sum = 0.0;
    let mut count = 0u64;
    for row in row_start..row_end {
        for col in col_start..col_end {
            sum += flow.cell(row as u32, col as u32).magnitude();
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    if mean.is_finite() {
        mean
    } else {
        0.0
    }
}

// Smallest grid index whose pixel position is >= `value`, floored at 0.
fn div_ceil_nonneg(value: i32, stride: i32) -> i32 {
    if value <= 0 {
        0
    } else {
        (value as u32).div_ceil(stride as u32) as i32
    }
}

// ----------------------------------------------------------------------------
// Motion oracles
// ----------------------------------------------------------------------------

/// Source of motion fields between consecutive grayscale frames.
pub trait MotionOracle: Send {
    fn name(&self) -> &'static str;

    fn compute_flow(&mut self, prev: &GrayFrame, cur: &GrayFrame) -> Result<MotionField>;
}

/// Magnitude proxy from per-cell mean absolute intensity change.
///
/// Each cell averages `|cur - prev|` over its `stride x stride` block and
/// reports it as `dx` scaled by `gain`. Direction is not estimated.
pub struct FrameDifferenceOracle {
    stride: u32,
    gain: f32,
}

impl FrameDifferenceOracle {
    pub fn new(stride: u32) -> Self {
        Self { stride, gain: 0.1 }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

impl MotionOracle for FrameDifferenceOracle {
    fn name(&self) -> &'static str {
        "frame-difference"
    }

    fn compute_flow(&mut self, prev: &GrayFrame, cur: &GrayFrame) -> Result<MotionField> {
        if prev.width != cur.width || prev.height != cur.height {
            return Err(anyhow!(
                "frame size changed from {}x{} to {}x{}",
                prev.width,
                prev.height,
                cur.width,
                cur.height
            ));
        }
        let (rows, cols) = grid_dims(cur.width, cur.height, self.stride)?;
        let mut cells = Vec::with_capacity(rows as usize * cols as usize);
        for row in 0..rows {
            for col in 0..cols {
                let y0 = row * self.stride;
                let x0 = col * self.stride;
                let y1 = (y0 + self.stride).min(cur.height);
                let x1 = (x0 + self.stride).min(cur.width);
                let mut total = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        total += prev.luma(x, y).abs_diff(cur.luma(x, y)) as u64;
                    }
                }
                let n = ((y1 - y0) * (x1 - x0)).max(1) as f32;
                cells.push(FlowVector::new(total as f32 / n * self.gain, 0.0));
            }
        }
        MotionField::new(cells, rows, cols, self.stride)
    }
}

/// Oracle that reports the same vector everywhere.
pub struct UniformOracle {
    stride: u32,
    vector: FlowVector,
}

impl UniformOracle {
    pub fn new(stride: u32, vector: FlowVector) -> Self {
        Self { stride, vector }
    }

    pub fn still(stride: u32) -> Self {
        Self::new(stride, FlowVector::default())
    }
}

impl MotionOracle for UniformOracle {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn compute_flow(&mut self, _prev: &GrayFrame, cur: &GrayFrame) -> Result<MotionField> {
        MotionField::uniform(cur.width, cur.height, self.stride, self.vector)
    }
}
