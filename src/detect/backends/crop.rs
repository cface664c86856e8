use anyhow::{anyhow, Context, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, ObjectClass, WeaponKind};
use crate::frame::Frame;
use crate::geometry::NormalizedBox;

/// Default score a crop must beat to count as a weapon sighting.
pub const DEFAULT_CROP_SCORE_THRESHOLD: f32 = 0.7;

/// Whole-image classifier returning the probability of the target label.
pub trait CropClassifier: Send {
    fn classify(&mut self, crop: &Frame) -> Result<f32>;
}

/// Weapon detector built from a person detector and a crop classifier.
///
/// For every person found, the upper half of the box (where a held weapon
/// usually is) is cropped and classified. Crops scoring above the threshold
/// are reported as weapon detections covering that upper half.
pub struct UpperBodyClassifier<C: CropClassifier> {
    kind: WeaponKind,
    people: Box<dyn DetectorBackend>,
    classifier: C,
    score_threshold: f32,
}

impl<C: CropClassifier> UpperBodyClassifier<C> {
    pub fn new(kind: WeaponKind, people: Box<dyn DetectorBackend>, classifier: C) -> Result<Self> {
        if !people.supports(DetectionCapability::HumanDetection) {
            return Err(anyhow!(
                "backend '{}' cannot detect people for crop classification",
                people.name()
            ));
        }
        Ok(Self {
            kind,
            people,
            classifier,
            score_threshold: DEFAULT_CROP_SCORE_THRESHOLD,
        })
    }

    /// Override the default score threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }
}

impl<C: CropClassifier> DetectorBackend for UpperBodyClassifier<C> {
    fn name(&self) -> &'static str {
        "upper-body-classifier"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.kind.capability()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let people = self.people.detect(frame)?;
        let mut found = Vec::new();
        for person in people.iter().filter(|d| d.class == ObjectClass::Human) {
            let upper = upper_half(&person.bbox);
            let rect = match upper.to_rect(frame.width, frame.height) {
                Ok(rect) => rect,
                Err(err) => {
                    log::warn!("skipping person box: {}", err);
                    continue;
                }
            };
            let Ok(crop) = frame.crop(&rect) else {
                continue;
            };
            let score = self
                .classifier
                .classify(&crop)
                .context("crop classification failed")?;
            log::debug!("{} crop score {:.5}", self.kind, score);
            if score > self.score_threshold {
                found.push(Detection::new(upper, score, self.kind.object_class()));
            }
        }
        Ok(found)
    }

    fn warm_up(&mut self) -> Result<()> {
        self.people.warm_up()
    }
}

fn upper_half(bbox: &NormalizedBox) -> NormalizedBox {
    NormalizedBox::new(
        bbox.xmin,
        bbox.ymin,
        bbox.xmax,
        bbox.ymin + (bbox.ymax - bbox.ymin) / 2.0,
    )
}
