//! Threat Sentinel
//!
//! Correlates person and weapon detections with frame-to-frame motion and
//! raises an alert only after enough risky observations pile up in a short
//! span of time.
//!
//! # Pipeline
//!
//! One camera feeds a `FrameDispatcher`, which hands every frame to one
//! `SessionWorker` per weapon kind. Each worker drives a `DetectorSession`:
//!
//! 1. preprocess (downscale, gamma),
//! 2. detect people and weapons,
//! 3. compute motion against the previous frame,
//! 4. fuse per-person weapon confidence and motion into a risk score,
//! 5. vote into a time-windowed ledger and alert on the threshold crossing.
//!
//! # Module Structure
//!
//! - `geometry`: pixel rectangles, normalized boxes, intersection
//! - `frame`: RGB frames and preprocessing
//! - `motion`: motion fields, region magnitude, motion oracles
//! - `risk`: risk fusion and threshold comparison
//! - `votes`: vote ledger with staleness eviction
//! - `detect`: detector backends and registry
//! - `session`: the per-frame state machine
//! - `ingest`, `worker`: frame fan-out and background sessions
//! - `annotate`: debug overlay
//! - `config`: file and environment configuration

pub mod annotate;
pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod motion;
pub mod risk;
pub mod session;
pub mod votes;
pub mod worker;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use config::{PreprocessSettings, SentinelConfig, SessionConfig, SourceSettings};
pub use detect::{
    BackendRegistry, CropClassifier, Detection, DetectionCapability, DetectorBackend,
    ObjectClass, ScriptedBackend, ScriptedClassifier, SharedBackend, UpperBodyClassifier,
    WeaponKind,
};
pub use frame::{Frame, GrayFrame, Preprocessor, SharedFrame};
pub use geometry::{intersects, NormalizedBox, Rect};
pub use ingest::{FrameDispatcher, FrameMessage, FrameSource, SourceStats};
pub use motion::{
    region_motion_magnitude, FlowVector, FrameDifferenceOracle, MotionField, MotionOracle,
    UniformOracle,
};
pub use risk::RiskFusion;
pub use session::{DetectorSession, FrameReport, HumanAssessment, SessionError, SessionState};
pub use votes::VoteLedger;
pub use worker::{
    Acknowledger, AlertSnapshot, SessionWorker, StopReason, WorkerEvent, WorkerHandle,
};
