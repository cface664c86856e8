use crate::geometry::NormalizedBox;

use super::backend::DetectionCapability;

/// One labelled box reported by a detector for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Normalized 0..1 coordinates of the frame passed to the detector.
    pub bbox: NormalizedBox,
    pub confidence: f32,
    pub class: ObjectClass,
}

impl Detection {
    pub fn new(bbox: NormalizedBox, confidence: f32, class: ObjectClass) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    pub fn human(bbox: NormalizedBox, confidence: f32) -> Self {
        Self::new(bbox, confidence, ObjectClass::Human)
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Human,
    Firearm,
    Blade,
}

/// Weapon category a detector session watches for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WeaponKind {
    Firearm,
    Blade,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 2] = [WeaponKind::Firearm, WeaponKind::Blade];

    pub fn object_class(self) -> ObjectClass {
        match self {
            WeaponKind::Firearm => ObjectClass::Firearm,
            WeaponKind::Blade => ObjectClass::Blade,
        }
    }

    pub fn capability(self) -> DetectionCapability {
        match self {
            WeaponKind::Firearm => DetectionCapability::FirearmDetection,
            WeaponKind::Blade => DetectionCapability::BladeDetection,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeaponKind::Firearm => "firearm",
            WeaponKind::Blade => "blade",
        }
    }
}

impl std::fmt::Display for WeaponKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
