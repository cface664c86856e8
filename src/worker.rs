//! Background worker running one detector session.
//!
//! Each worker owns its session outright and is fed by a `FrameDispatcher`
//! subscription. Workers share nothing but the frames, so a firearm worker and
//! a blade worker on the same camera keep independent ledgers and alerts.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::WeaponKind;
use crate::ingest::FrameMessage;
use crate::session::DetectorSession;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Notifications a worker emits to its owner.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    Frame {
        kind: WeaponKind,
        vote_count: usize,
        alert_fired: bool,
    },
    /// The ledger crossed the alert threshold.
    Alert { kind: WeaponKind, vote_count: usize },
    /// The worker exited.
    Stopped { kind: WeaponKind, reason: StopReason },
}

/// Why a worker exited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `WorkerHandle::stop` was called.
    Requested,
    /// The camera feed ended or the dispatcher shut down.
    EndOfStream,
    /// The camera, a detector or the motion oracle failed.
    Failed(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

/// Clonable handle for re-arming a worker's alert from another thread.
#[derive(Clone, Debug)]
pub struct Acknowledger {
    kind: WeaponKind,
    flag: Arc<AtomicBool>,
}

impl Acknowledger {
    pub fn kind(&self) -> WeaponKind {
        self.kind
    }

    /// Ask the worker to clear its evidence and re-arm. Applied when the next
    /// frame arrives.
    pub fn acknowledge(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Live view of a worker's state, readable from any thread.
#[derive(Debug, Default)]
pub struct AlertSnapshot {
    vote_count: AtomicUsize,
    alerting: AtomicBool,
    alerts_fired: AtomicU64,
    frames_processed: AtomicU64,
    stopped: AtomicBool,
}

impl AlertSnapshot {
    pub fn vote_count(&self) -> usize {
        self.vote_count.load(Ordering::SeqCst)
    }

    pub fn alerting(&self) -> bool {
        self.alerting.load(Ordering::SeqCst)
    }

    pub fn alerts_fired(&self) -> u64 {
        self.alerts_fired.load(Ordering::SeqCst)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    kind: WeaponKind,
    shutdown: Arc<AtomicBool>,
    acknowledge: Arc<AtomicBool>,
    snapshot: Arc<AlertSnapshot>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn kind(&self) -> WeaponKind {
        self.kind
    }

    pub fn snapshot(&self) -> &AlertSnapshot {
        &self.snapshot
    }

    /// Ask the worker to clear its evidence and re-arm. Applied when the next
    /// frame arrives.
    pub fn acknowledge(&self) {
        self.acknowledger().acknowledge();
    }

    pub fn acknowledger(&self) -> Acknowledger {
        Acknowledger {
            kind: self.kind,
            flag: self.acknowledge.clone(),
        }
    }

    /// Ask the worker to stop after the frame in flight.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn join(mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("{} worker thread panicked", self.kind))?;
        }
        Ok(())
    }
}

pub struct SessionWorker;

impl SessionWorker {
    /// Move `session` onto its own thread, fed from `frames`.
    pub fn spawn(
        session: DetectorSession,
        frames: Receiver<FrameMessage>,
        events: Sender<WorkerEvent>,
    ) -> Result<WorkerHandle> {
        let kind = session.kind();
        let shutdown = Arc::new(AtomicBool::new(false));
        let acknowledge = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(AlertSnapshot::default());

        let flags = WorkerFlags {
            shutdown: shutdown.clone(),
            acknowledge: acknowledge.clone(),
            snapshot: snapshot.clone(),
        };
        let join = std::thread::Builder::new()
            .name(format!("{}-worker", kind.label()))
            .spawn(move || run_worker(session, frames, events, flags))?;

        Ok(WorkerHandle {
            kind,
            shutdown,
            acknowledge,
            snapshot,
            join: Some(join),
        })
    }
}

struct WorkerFlags {
    shutdown: Arc<AtomicBool>,
    acknowledge: Arc<AtomicBool>,
    snapshot: Arc<AlertSnapshot>,
}

fn run_worker(
    mut session: DetectorSession,
    frames: Receiver<FrameMessage>,
    events: Sender<WorkerEvent>,
    flags: WorkerFlags,
) {
    let kind = session.kind();
    let reason = loop {
        if flags.shutdown.load(Ordering::SeqCst) {
            break StopReason::Requested;
        }
        let message = match frames.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => FrameMessage::EndOfStream,
        };
        let frame = match message {
            FrameMessage::Frame(frame) => frame,
            FrameMessage::EndOfStream => break StopReason::EndOfStream,
            FrameMessage::SourceFailed(cause) => {
                let err = session.source_failed(anyhow!(cause));
                break StopReason::Failed(err.to_string());
            }
        };

        if flags.acknowledge.swap(false, Ordering::SeqCst) {
            session.acknowledge_alert();
            flags.snapshot.vote_count.store(0, Ordering::SeqCst);
            flags.snapshot.alerting.store(false, Ordering::SeqCst);
        }

        match session.process_frame(Some(frame.as_ref())) {
            Ok(report) => {
                let snapshot = &flags.snapshot;
                snapshot.frames_processed.fetch_add(1, Ordering::SeqCst);
                snapshot.vote_count.store(report.vote_count, Ordering::SeqCst);
                snapshot.alerting.store(report.alerting, Ordering::SeqCst);
                if report.alert_fired {
                    snapshot.alerts_fired.fetch_add(1, Ordering::SeqCst);
                    let _ = events.send(WorkerEvent::Alert {
                        kind,
                        vote_count: report.vote_count,
                    });
                }
                let _ = events.send(WorkerEvent::Frame {
                    kind,
                    vote_count: report.vote_count,
                    alert_fired: report.alert_fired,
                });
            }
            Err(err) => break StopReason::Failed(err.to_string()),
        }
    };

    session.stop();
    flags.snapshot.stopped.store(true, Ordering::SeqCst);
    match &reason {
        StopReason::Failed(err) => log::error!("{} worker stopped: {}", kind, err),
        other => log::info!("{} worker stopped: {:?}", kind, other),
    }
    let _ = events.send(WorkerEvent::Stopped { kind, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{PreprocessSettings, SessionConfig};
    use crate::detect::{Detection, DetectionCapability, ObjectClass, ScriptedBackend};
    use crate::frame::Frame;
    use crate::geometry::NormalizedBox;
    use crate::motion::{FlowVector, UniformOracle};
    use std::sync::{mpsc, Mutex};

    fn blade_session(clock: ManualClock) -> DetectorSession {
        let person = Detection::human(NormalizedBox::new(0.0, 0.0, 0.5, 1.0), 0.9);
        let knife = Detection::new(
            NormalizedBox::new(0.4, 0.4, 0.6, 0.6),
            1.0,
            ObjectClass::Blade,
        );
        DetectorSession::with_backends(
            WeaponKind::Blade,
            Arc::new(Mutex::new(
                ScriptedBackend::new("people", &[DetectionCapability::HumanDetection])
                    .with_fixed(vec![person]),
            )),
            Arc::new(Mutex::new(
                ScriptedBackend::new("knives", &[DetectionCapability::BladeDetection])
                    .with_fixed(vec![knife]),
            )),
            Box::new(UniformOracle::new(4, FlowVector::new(10.0, 0.0))),
            Box::new(clock),
            SessionConfig {
                alert_threshold: 2,
                preprocess: PreprocessSettings {
                    scale: 1.0,
                    gamma: 1.0,
                },
                annotate: false,
                ..SessionConfig::default()
            },
        )
        .unwrap()
    }

    fn frame() -> FrameMessage {
        FrameMessage::Frame(Arc::new(Frame::filled(40, 40, [0, 0, 0]).unwrap()))
    }

    fn stopped(reason: StopReason) -> WorkerEvent {
        WorkerEvent::Stopped {
            kind: WeaponKind::Blade,
            reason,
        }
    }

    #[test]
    fn worker_reports_alert_and_stops_at_end_of_stream() {
        let (frame_tx, frame_rx) = mpsc::sync_channel(8);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();

        for _ in 0..3 {
            frame_tx.send(frame()).unwrap();
        }
        frame_tx.send(FrameMessage::EndOfStream).unwrap();

        let events: Vec<WorkerEvent> = event_rx.iter().collect();
        assert!(events.contains(&WorkerEvent::Alert {
            kind: WeaponKind::Blade,
            vote_count: 2,
        }));
        assert_eq!(events.last(), Some(&stopped(StopReason::EndOfStream)));
        assert_eq!(handle.snapshot().frames_processed(), 3);
        assert_eq!(handle.snapshot().alerts_fired(), 1);
        assert!(handle.snapshot().stopped());
        handle.join().unwrap();
    }

    #[test]
    fn acknowledge_clears_snapshot_and_rearms() {
        let (frame_tx, frame_rx) = mpsc::sync_channel(8);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();

        for _ in 0..3 {
            frame_tx.send(frame()).unwrap();
        }
        // warm-up plus two voting frames
        for _ in 0..3 {
            event_rx.recv().unwrap();
        }
        assert!(handle.snapshot().alerting());

        handle.acknowledge();
        for _ in 0..2 {
            frame_tx.send(frame()).unwrap();
        }
        frame_tx.send(FrameMessage::EndOfStream).unwrap();
        let events: Vec<WorkerEvent> = event_rx.iter().collect();
        let alerts = events
            .iter()
            .filter(|e| matches!(e, WorkerEvent::Alert { .. }))
            .count();
        assert_eq!(alerts, 1);
        assert_eq!(handle.snapshot().alerts_fired(), 2);
        handle.join().unwrap();
    }

    #[test]
    fn stop_flag_ends_idle_worker() {
        let (_frame_tx, frame_rx) = mpsc::sync_channel::<FrameMessage>(1);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();
        handle.stop();
        assert_eq!(event_rx.recv().unwrap(), stopped(StopReason::Requested));
        handle.join().unwrap();
    }

    #[test]
    fn source_failure_is_reported_as_an_error() {
        let (frame_tx, frame_rx) = mpsc::sync_channel(8);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();

        frame_tx.send(frame()).unwrap();
        frame_tx
            .send(FrameMessage::SourceFailed("camera unplugged".to_string()))
            .unwrap();

        let events: Vec<WorkerEvent> = event_rx.iter().collect();
        match events.last() {
            Some(WorkerEvent::Stopped { reason, .. }) => {
                assert!(reason.is_failure());
                assert_eq!(
                    reason,
                    &StopReason::Failed("frame source failed: camera unplugged".to_string())
                );
            }
            other => panic!("expected a stop event, got {:?}", other),
        }
        assert_eq!(handle.snapshot().frames_processed(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn dropped_feed_counts_as_end_of_stream() {
        let (frame_tx, frame_rx) = mpsc::sync_channel(8);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();
        frame_tx.send(frame()).unwrap();
        drop(frame_tx);

        let events: Vec<WorkerEvent> = event_rx.iter().collect();
        assert_eq!(events.last(), Some(&stopped(StopReason::EndOfStream)));
        assert!(!StopReason::EndOfStream.is_failure());
        handle.join().unwrap();
    }

    #[test]
    fn acknowledger_rearms_from_another_thread() {
        let (frame_tx, frame_rx) = mpsc::sync_channel(8);
        let (event_tx, event_rx) = mpsc::channel();
        let handle =
            SessionWorker::spawn(blade_session(ManualClock::new(0)), frame_rx, event_tx).unwrap();
        let acknowledger = handle.acknowledger();
        assert_eq!(acknowledger.kind(), WeaponKind::Blade);

        // warm-up plus two voting frames fire the first alert
        for _ in 0..3 {
            frame_tx.send(frame()).unwrap();
        }
        let first = event_rx
            .iter()
            .find(|e| matches!(e, WorkerEvent::Alert { .. }))
            .unwrap();
        assert_eq!(
            first,
            WorkerEvent::Alert {
                kind: WeaponKind::Blade,
                vote_count: 2,
            }
        );

        std::thread::spawn(move || acknowledger.acknowledge())
            .join()
            .unwrap();
        for _ in 0..2 {
            frame_tx.send(frame()).unwrap();
        }
        frame_tx.send(FrameMessage::EndOfStream).unwrap();

        let rest: Vec<WorkerEvent> = event_rx.iter().collect();
        assert!(rest.contains(&WorkerEvent::Alert {
            kind: WeaponKind::Blade,
            vote_count: 2,
        }));
        assert_eq!(handle.snapshot().alerts_fired(), 2);
        handle.join().unwrap();
    }
}
