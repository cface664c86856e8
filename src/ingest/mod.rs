//! Frame ingestion.
//!
//! - `FrameSource`: anything that yields frames (camera, file, synthetic).
//! - `SyntheticSource` / `FrameSequence`: stand-ins for tests and the demo daemon.
//! - `FrameDispatcher`: the one place that reads from a shared camera and fans
//!   each frame out to the detector workers.
//!
//! Sessions never call a shared source directly; two readers on one camera
//! would advance the stream out from under each other's previous-frame state.

pub mod dispatcher;
pub mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use dispatcher::{FrameDispatcher, FrameMessage};
pub use synthetic::{FrameSequence, SyntheticConfig, SyntheticSource};

/// Producer of frames.
///
/// `Ok(None)` signals end of stream. `Err` signals the device failed.
pub trait FrameSource: Send {
    /// Connect to the source. Defaults to a no-op.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}
