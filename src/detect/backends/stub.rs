use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::backends::crop::CropClassifier;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for tests and the synthetic daemon.
///
/// Replays a script of per-frame detections, cycling once it runs out.
/// An empty script reports nothing.
pub struct ScriptedBackend {
    name: &'static str,
    capabilities: Vec<DetectionCapability>,
    script: Vec<Vec<Detection>>,
    cursor: usize,
    fail_after: Option<usize>,
}

impl ScriptedBackend {
    pub fn new(name: &'static str, capabilities: &[DetectionCapability]) -> Self {
        Self {
            name,
            capabilities: capabilities.to_vec(),
            script: Vec::new(),
            cursor: 0,
            fail_after: None,
        }
    }

    /// Report the same detections on every frame.
    pub fn with_fixed(mut self, detections: Vec<Detection>) -> Self {
        self.script = vec![detections];
        self
    }

    /// Report `script[i % len]` on the i-th frame.
    pub fn with_script(mut self, script: Vec<Vec<Detection>>) -> Self {
        self.script = script;
        self
    }

    /// Simulate the detector going away after `frames` successful calls.
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.fail_after.is_some_and(|limit| self.cursor >= limit) {
            return Err(anyhow!("{} backend unavailable", self.name));
        }
        let detections = if self.script.is_empty() {
            Vec::new()
        } else {
            self.script[self.cursor % self.script.len()].clone()
        };
        self.cursor += 1;
        Ok(detections)
    }
}

/// Crop classifier replaying a cycle of scores, one per crop.
pub struct ScriptedClassifier {
    scores: Vec<f32>,
    cursor: usize,
}

impl ScriptedClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores, cursor: 0 }
    }
}

impl CropClassifier for ScriptedClassifier {
    fn classify(&mut self, _crop: &Frame) -> Result<f32> {
        if self.scores.is_empty() {
            return Ok(0.0);
        }
        let score = self.scores[self.cursor % self.scores.len()];
        self.cursor += 1;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedBox;

    #[test]
    fn scripted_backend_cycles_script() {
        let frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        let person = Detection::human(NormalizedBox::new(0.0, 0.0, 0.5, 0.5), 0.9);
        let mut backend = ScriptedBackend::new("people", &[DetectionCapability::HumanDetection])
            .with_script(vec![vec![person.clone()], vec![]]);

        assert!(backend.supports(DetectionCapability::HumanDetection));
        assert!(!backend.supports(DetectionCapability::BladeDetection));
        assert_eq!(backend.detect(&frame).unwrap(), vec![person.clone()]);
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.detect(&frame).unwrap(), vec![person]);
    }

    #[test]
    fn scripted_backend_can_fail() {
        let frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        let mut backend =
            ScriptedBackend::new("flaky", &[DetectionCapability::HumanDetection]).failing_after(1);
        assert!(backend.detect(&frame).is_ok());
        assert!(backend.detect(&frame).is_err());
    }

    #[test]
    fn scripted_classifier_cycles_scores() {
        let crop = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        let mut classifier = ScriptedClassifier::new(vec![0.9, 0.1]);
        assert_eq!(classifier.classify(&crop).unwrap(), 0.9);
        assert_eq!(classifier.classify(&crop).unwrap(), 0.1);
        assert_eq!(classifier.classify(&crop).unwrap(), 0.9);
        assert_eq!(ScriptedClassifier::new(Vec::new()).classify(&crop).unwrap(), 0.0);
    }
}
