//! Detector session: one weapon kind, one vote ledger, one frame at a time.
//!
//! Per frame the session
//! 1. preprocesses the frame (downscale, gamma),
//! 2. asks the person and weapon detectors for boxes,
//! 3. asks the motion oracle for the field since the previous frame,
//! 4. scores every person by fusing nearby weapon confidence with the motion
//!    inside their box and votes once per person whose risk exceeds the threshold,
//! 5. remembers the frame for the next cycle,
//! 6. reports whether the ledger is alerting, firing the alert only on the
//!    transition into the alerting state.
//!
//! The session is `Idle` until its first frame (which only seeds the motion
//! buffer), `Running` afterwards, and `Stopped` for good once stopped or after
//! a resource failure.

use std::fmt;

use anyhow::anyhow;

use crate::annotate::{Annotator, HUMAN_COLOR, WEAPON_COLOR};
use crate::clock::{Clock, Timestamp};
use crate::config::SessionConfig;
use crate::detect::{
    BackendRegistry, Detection, DetectionCapability, ObjectClass, SharedBackend, WeaponKind,
};
use crate::frame::{Frame, GrayFrame, Preprocessor};
use crate::geometry::{intersects, Rect};
use crate::ingest::FrameSource;
use crate::motion::{region_motion_magnitude, MotionField, MotionOracle};
use crate::risk::RiskFusion;
use crate::votes::VoteLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the warm-up frame.
    Idle,
    Running,
    /// Terminal.
    Stopped,
}

/// Terminal session failures. Every variant leaves the session `Stopped`.
#[derive(Debug)]
pub enum SessionError {
    /// The camera delivered no frame.
    FrameUnavailable,
    /// The camera itself failed.
    Source(anyhow::Error),
    /// A detector backend failed or is unusable.
    Detector(anyhow::Error),
    /// The motion oracle failed.
    MotionOracle(anyhow::Error),
    /// The session was already stopped.
    Stopped,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::FrameUnavailable => write!(f, "no frame available from camera"),
            SessionError::Source(err) => write!(f, "frame source failed: {:#}", err),
            SessionError::Detector(err) => write!(f, "detector failed: {:#}", err),
            SessionError::MotionOracle(err) => write!(f, "motion oracle failed: {:#}", err),
            SessionError::Stopped => write!(f, "session is stopped"),
        }
    }
}

impl std::error::Error for SessionError {}

/// How one person in the frame was scored.
#[derive(Clone, Debug, PartialEq)]
pub struct HumanAssessment {
    pub rect: Rect,
    /// Highest confidence among weapons touching the person, 0 if none.
    pub weapon_confidence: f64,
    /// Mean motion magnitude inside the person's box.
    pub motion: f64,
    pub risk: f64,
    pub voted: bool,
}

/// Outcome of processing one frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub kind: WeaponKind,
    pub timestamp: Timestamp,
    /// True for the frame that only seeded the motion buffer.
    pub warm_up: bool,
    pub humans: Vec<HumanAssessment>,
    pub vote_count: usize,
    /// The ledger is at or above the alert threshold.
    pub alerting: bool,
    /// First frame of an alerting run since the last acknowledgement.
    pub alert_fired: bool,
    pub annotated_debug_image: Option<Frame>,
}

pub struct DetectorSession {
    kind: WeaponKind,
    config: SessionConfig,
    state: SessionState,
    ledger: VoteLedger,
    fusion: RiskFusion,
    preprocessor: Preprocessor,
    prev_gray: Option<GrayFrame>,
    people: SharedBackend,
    weapons: SharedBackend,
    oracle: Box<dyn MotionOracle>,
    clock: Box<dyn Clock>,
    armed: bool,
    frames_processed: u64,
}

impl DetectorSession {
    /// Build a session, resolving both detectors from the registry.
    pub fn create(
        kind: WeaponKind,
        registry: &BackendRegistry,
        oracle: Box<dyn MotionOracle>,
        clock: Box<dyn Clock>,
        config: SessionConfig,
    ) -> anyhow::Result<Self> {
        let people = registry.backend_for_capability(DetectionCapability::HumanDetection)?;
        let weapons = registry.backend_for_capability(kind.capability())?;
        Self::with_backends(kind, people, weapons, oracle, clock, config)
    }

    pub fn with_backends(
        kind: WeaponKind,
        people: SharedBackend,
        weapons: SharedBackend,
        oracle: Box<dyn MotionOracle>,
        clock: Box<dyn Clock>,
        config: SessionConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let ledger = VoteLedger::new(config.staleness_window_ms, config.alert_threshold)?;
        let fusion = RiskFusion::new(config.motion_normalization)?;
        let preprocessor = Preprocessor::new(config.preprocess.scale, config.preprocess.gamma);

        for backend in [&people, &weapons] {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard.warm_up()?;
        }
        log::info!(
            "{} session created (oracle={}, window={}ms, alert at {} votes, risk > {})",
            kind,
            oracle.name(),
            config.staleness_window_ms,
            config.alert_threshold,
            config.risk_threshold
        );

        Ok(Self {
            kind,
            config,
            state: SessionState::Idle,
            ledger,
            fusion,
            preprocessor,
            prev_gray: None,
            people,
            weapons,
            oracle,
            clock,
            armed: true,
            frames_processed: 0,
        })
    }

    pub fn kind(&self) -> WeaponKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn vote_count(&self) -> usize {
        self.ledger.vote_count()
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Pull one frame from `source` and process it.
    pub fn process_next_frame(
        &mut self,
        source: &mut dyn FrameSource,
    ) -> Result<FrameReport, SessionError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }
        match source.next_frame() {
            Ok(frame) => self.process_frame(frame.as_ref()),
            Err(err) => Err(self.fail(SessionError::Source(err))),
        }
    }

    /// Process one frame. `None` means the camera produced nothing, which stops
    /// the session.
    pub fn process_frame(&mut self, frame: Option<&Frame>) -> Result<FrameReport, SessionError> {
        if self.state == SessionState::Stopped {
            return Err(SessionError::Stopped);
        }
        let Some(frame) = frame else {
            return Err(self.fail(SessionError::FrameUnavailable));
        };

        let frame = self.preprocessor.apply(frame);
        let gray = frame.to_gray();
        let now = self.clock.now_ms();
        self.frames_processed += 1;

        let Some(prev_gray) = self.prev_gray.take() else {
            self.prev_gray = Some(gray);
            self.state = SessionState::Running;
            log::debug!("{} session warmed up", self.kind);
            return Ok(self.report(now, true, Vec::new(), false, None));
        };

        // Evidence that went stale while nothing was voting goes before scoring.
        self.ledger.evict_stale(now);

        let people = match run_detector(&self.people, &frame) {
            Ok(found) => found,
            Err(err) => return Err(self.fail(SessionError::Detector(err))),
        };
        let weapons = match run_detector(&self.weapons, &frame) {
            Ok(found) => found,
            Err(err) => return Err(self.fail(SessionError::Detector(err))),
        };
        let flow = match self.oracle.compute_flow(&prev_gray, &gray) {
            Ok(flow) => flow,
            Err(err) => return Err(self.fail(SessionError::MotionOracle(err))),
        };

        let people = self.ingest(&people, ObjectClass::Human, self.config.human_min_score, &frame);
        let weapons = self.ingest(
            &weapons,
            self.kind.object_class(),
            self.config.weapon_min_score,
            &frame,
        );

        let humans = self.score(&people, &weapons, &flow, now);
        self.prev_gray = Some(gray);

        let alert_fired = self.ledger.should_alert() && self.armed;
        if alert_fired {
            self.armed = false;
            log::warn!(
                "{} alert: {} votes within {} ms",
                self.kind,
                self.ledger.vote_count(),
                self.config.staleness_window_ms
            );
        }

        let image = self
            .config
            .annotate
            .then(|| annotate(&frame, &people, &weapons, &flow));
        Ok(self.report(now, false, humans, alert_fired, image))
    }

    /// Clear the evidence and re-arm the alert.
    pub fn acknowledge_alert(&mut self) {
        log::info!(
            "{} alert acknowledged, discarding {} votes",
            self.kind,
            self.ledger.vote_count()
        );
        self.ledger.clear();
        self.armed = true;
    }

    /// Stop because the shared camera failed upstream of this session.
    pub fn source_failed(&mut self, err: anyhow::Error) -> SessionError {
        if self.state == SessionState::Stopped {
            return SessionError::Stopped;
        }
        self.fail(SessionError::Source(err))
    }

    pub fn stop(&mut self) {
        if self.state != SessionState::Stopped {
            log::info!(
                "{} session stopped after {} frames",
                self.kind,
                self.frames_processed
            );
        }
        self.state = SessionState::Stopped;
        self.prev_gray = None;
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        log::error!("{} session stopping: {}", self.kind, err);
        self.state = SessionState::Stopped;
        self.prev_gray = None;
        err
    }

    /// Keep detections of `class` scoring strictly above `min_score`, in pixel space.
    fn ingest(
        &self,
        detections: &[Detection],
        class: ObjectClass,
        min_score: f32,
        frame: &Frame,
    ) -> Vec<(Rect, f64)> {
        detections
            .iter()
            .filter(|d| d.class == class && d.confidence > min_score)
            .filter_map(|d| match d.bbox.to_rect(frame.width, frame.height) {
                Ok(rect) => Some((rect, d.confidence.clamp(0.0, 1.0) as f64)),
                Err(err) => {
                    log::warn!("{} session dropped {:?} detection: {}", self.kind, class, err);
                    None
                }
            })
            .collect()
    }

    fn score(
        &mut self,
        people: &[(Rect, f64)],
        weapons: &[(Rect, f64)],
        flow: &MotionField,
        now: Timestamp,
    ) -> Vec<HumanAssessment> {
        let mut humans = Vec::with_capacity(people.len());
        for (rect, _) in people {
            let weapon_confidence = weapons
                .iter()
                .filter(|(weapon, _)| intersects(rect, weapon))
                .map(|(_, confidence)| *confidence)
                .fold(0.0, f64::max);
            let motion = region_motion_magnitude(flow, rect);
            let risk = self.fusion.fuse(motion, weapon_confidence);
            let voted = RiskFusion::exceeds(risk, self.config.risk_threshold);
            log::debug!(
                "{} person {:?}: weapon confidence {:.3}, motion {:.3}, risk {:.3}",
                self.kind,
                rect,
                weapon_confidence,
                motion,
                risk
            );
            if voted {
                self.ledger.record_vote(now);
            }
            humans.push(HumanAssessment {
                rect: *rect,
                weapon_confidence,
                motion,
                risk,
                voted,
            });
        }
        humans
    }

    fn report(
        &self,
        timestamp: Timestamp,
        warm_up: bool,
        humans: Vec<HumanAssessment>,
        alert_fired: bool,
        annotated_debug_image: Option<Frame>,
    ) -> FrameReport {
        FrameReport {
            kind: self.kind,
            timestamp,
            warm_up,
            humans,
            vote_count: self.ledger.vote_count(),
            alerting: self.ledger.should_alert(),
            alert_fired,
            annotated_debug_image,
        }
    }
}

fn run_detector(backend: &SharedBackend, frame: &Frame) -> anyhow::Result<Vec<Detection>> {
    let mut guard = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    guard.detect(frame)
}

fn annotate(
    frame: &Frame,
    people: &[(Rect, f64)],
    weapons: &[(Rect, f64)],
    flow: &MotionField,
) -> Frame {
    let mut annotator = Annotator::new(frame);
    for (rect, _) in people {
        annotator.rect(rect, HUMAN_COLOR, 1);
    }
    for (rect, _) in weapons {
        annotator.rect(rect, WEAPON_COLOR, 2);
    }
    annotator.flow(flow);
    annotator.finish()
}
