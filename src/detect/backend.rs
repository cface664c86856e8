use anyhow::Result;

use crate::frame::Frame;

use super::result::Detection;

/// Detection capabilities a backend can offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    HumanDetection,
    FirearmDetection,
    BladeDetection,
}

/// Detector backend trait.
///
/// Backends are black boxes to the engine: a frame goes in, labelled boxes in
/// normalized coordinates come out. A backend may run full-frame detection or
/// classify crops internally. Errors are treated as the detector being
/// unavailable and stop the session that called it.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the frame as read-only and must not retain it.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
