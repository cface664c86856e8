pub mod crop;
pub mod stub;

pub use crop::{CropClassifier, UpperBodyClassifier};
pub use stub::{ScriptedBackend, ScriptedClassifier};
