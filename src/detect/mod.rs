mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{CropClassifier, ScriptedBackend, ScriptedClassifier, UpperBodyClassifier};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{Detection, ObjectClass, WeaponKind};
