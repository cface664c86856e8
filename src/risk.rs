//! Fusion of motion and weapon evidence into a single risk score.

use anyhow::{anyhow, Result};

/// Default motion magnitude treated as the ceiling of ordinary activity.
pub const DEFAULT_MOTION_NORMALIZATION: f64 = 9.0;

/// Tolerance for the strict threshold comparison.
///
/// Detector confidences arrive as `f32`; widening one to `f64` is off by at
/// most 2^-25 (about 3e-8), halved again by the weapon weight. The tolerance
/// sits just above that, so only representation noise is ignored.
pub const RISK_EPSILON: f64 = 1e-7;

const MOTION_WEIGHT: f64 = 0.5;
const WEAPON_WEIGHT: f64 = 0.5;

/// Equal-weight blend of normalized motion and weapon confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskFusion {
    normalization: f64,
}

impl RiskFusion {
    pub fn new(normalization: f64) -> Result<Self> {
        if !normalization.is_finite() || normalization <= 0.0 {
            return Err(anyhow!(
                "motion normalization must be a positive finite number, got {}",
                normalization
            ));
        }
        Ok(Self { normalization })
    }

    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Risk in `[0, 1]`. Non-finite inputs count as no evidence.
    pub fn fuse(&self, motion_magnitude: f64, weapon_confidence: f64) -> f64 {
        let motion = unit(motion_magnitude / self.normalization);
        let weapon = unit(weapon_confidence);
        (motion * MOTION_WEIGHT + weapon * WEAPON_WEIGHT).clamp(0.0, 1.0)
    }

    /// Strict `risk > threshold`, ignoring differences below `RISK_EPSILON`.
    pub fn exceeds(risk: f64, threshold: f64) -> bool {
        risk - threshold > RISK_EPSILON
    }
}

impl Default for RiskFusion {
    fn default() -> Self {
        Self {
            normalization: DEFAULT_MOTION_NORMALIZATION,
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
