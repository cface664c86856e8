//! sentineld - threat sentinel daemon
//!
//! This daemon:
//! 1. Reads frames from the configured source (synthetic `stub://` cameras)
//! 2. Fans every frame out to one detector session per weapon kind
//! 3. Scores people by nearby weapon confidence and motion
//! 4. Logs an alert whenever a session's vote ledger crosses its threshold,
//!    then acknowledges it so the session collects fresh evidence

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use threat_sentinel::{
    ingest::{SyntheticConfig, SyntheticSource},
    Acknowledger, BackendRegistry, Detection, DetectionCapability, DetectorSession,
    FrameDifferenceOracle, FrameDispatcher, MonotonicClock, NormalizedBox, ObjectClass,
    ScriptedBackend, ScriptedClassifier, SentinelConfig, SessionWorker, StopReason,
    UpperBodyClassifier, WeaponKind, WorkerEvent,
};

/// Frames each worker may lag behind the camera.
const WORKER_QUEUE: usize = 4;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Stop after this many frames (default: run until Ctrl-C).
    #[arg(long)]
    frames: Option<u64>,
    /// Per-pixel noise amplitude of the synthetic camera.
    #[arg(long, default_value_t = 6)]
    noise: u8,
    /// Find firearms by classifying upper-body crops of each person instead
    /// of with a box detector.
    #[arg(long)]
    crop_classifier: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = SentinelConfig::load_from(args.config.as_deref())?;
    log::info!(
        "sentineld {} starting: source={} {}x{} @ {} fps",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.source.width,
        cfg.source.height,
        cfg.source.target_fps
    );

    let source = SyntheticSource::new(SyntheticConfig {
        url: cfg.source.url.clone(),
        width: cfg.source.width,
        height: cfg.source.height,
        max_frames: args.frames,
        noise: args.noise,
    })?;
    let mut dispatcher = FrameDispatcher::new(Box::new(source));
    let registry = demo_registry(args.crop_classifier)?;
    log::info!("detector backends: {}", registry.list().join(", "));

    let (event_tx, event_rx) = mpsc::channel();
    let mut workers = Vec::new();
    for kind in WeaponKind::ALL {
        let session = DetectorSession::create(
            kind,
            &registry,
            Box::new(FrameDifferenceOracle::new(cfg.flow_stride)),
            Box::new(MonotonicClock::new()),
            cfg.session.clone(),
        )?;
        let frames = dispatcher.subscribe(WORKER_QUEUE);
        workers.push(SessionWorker::spawn(session, frames, event_tx.clone())?);
    }
    drop(event_tx);

    let acknowledgers: Vec<Acknowledger> = workers.iter().map(|w| w.acknowledger()).collect();
    let reporter = std::thread::spawn(move || {
        report_events(event_rx, |kind| {
            for ack in acknowledgers.iter().filter(|a| a.kind() == kind) {
                ack.acknowledge();
            }
        })
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "sentineld running with {} workers (Ctrl-C to stop)",
        workers.len()
    );
    let pace = Duration::from_millis(1000 / u64::from(cfg.source.target_fps));
    let outcome = dispatcher.run(&shutdown, Some(pace));

    for worker in workers {
        let kind = worker.kind();
        let snapshot = worker.snapshot();
        log::info!(
            "{} worker: frames={} votes={} alerts={}",
            kind,
            snapshot.frames_processed(),
            snapshot.vote_count(),
            snapshot.alerts_fired()
        );
        worker.stop();
        worker.join()?;
    }
    let alerts = reporter
        .join()
        .map_err(|_| anyhow!("event reporter thread panicked"))?;

    let stats = dispatcher.source_stats();
    log::info!(
        "source {}: {} frames captured",
        stats.url,
        stats.frames_captured
    );
    let ticks = outcome?;
    log::info!("sentineld stopped after {} frames, {} alerts", ticks, alerts);
    Ok(())
}

/// Log worker events until every worker has gone. Each alert is handed to
/// `acknowledge` so its session re-arms. Returns the number of alerts seen.
fn report_events(events: mpsc::Receiver<WorkerEvent>, acknowledge: impl Fn(WeaponKind)) -> u64 {
    let mut alerts = 0;
    for event in events {
        match event {
            WorkerEvent::Alert { kind, vote_count } => {
                log::warn!("ALERT: {} threat confirmed by {} votes", kind, vote_count);
                alerts += 1;
                acknowledge(kind);
            }
            WorkerEvent::Frame {
                kind, vote_count, ..
            } => {
                log::debug!("{} frame processed, votes={}", kind, vote_count);
            }
            WorkerEvent::Stopped {
                kind,
                reason: StopReason::Failed(err),
            } => {
                log::error!("{} worker failed: {}", kind, err);
            }
            WorkerEvent::Stopped { kind, reason } => {
                log::info!("{} worker finished ({:?})", kind, reason);
            }
        }
    }
    alerts
}

/// Scripted detectors standing in for real models on the synthetic feed:
/// one person in the left half, a firearm in their hands every third frame
/// and a blade every fifth. With `crop_classifier` the firearm is found by
/// scoring the person's upper body instead.
fn demo_registry(crop_classifier: bool) -> Result<BackendRegistry> {
    let person = Detection::human(NormalizedBox::new(0.1, 0.1, 0.45, 0.95), 0.85);
    let in_hand = NormalizedBox::new(0.3, 0.45, 0.4, 0.55);

    let weapon_script = |class: ObjectClass, every: usize| -> Vec<Vec<Detection>> {
        (0..every)
            .map(|i| {
                if i == 0 {
                    vec![Detection::new(in_hand, 0.9, class)]
                } else {
                    Vec::new()
                }
            })
            .collect()
    };

    let people = || {
        ScriptedBackend::new("scripted-people", &[DetectionCapability::HumanDetection])
            .with_fixed(vec![person.clone()])
    };

    let mut registry = BackendRegistry::new();
    registry.register(people());
    if crop_classifier {
        registry.register(UpperBodyClassifier::new(
            WeaponKind::Firearm,
            Box::new(people()),
            ScriptedClassifier::new(vec![0.9, 0.2, 0.2]),
        )?);
    } else {
        registry.register(
            ScriptedBackend::new("scripted-firearm", &[DetectionCapability::FirearmDetection])
                .with_script(weapon_script(ObjectClass::Firearm, 3)),
        );
    }
    registry.register(
        ScriptedBackend::new("scripted-blade", &[DetectionCapability::BladeDetection])
            .with_script(weapon_script(ObjectClass::Blade, 5)),
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use threat_sentinel::{DetectorBackend, Frame};

    #[test]
    fn every_alert_is_acknowledged() {
        let (tx, rx) = mpsc::channel();
        for kind in [WeaponKind::Blade, WeaponKind::Firearm, WeaponKind::Blade] {
            tx.send(WorkerEvent::Alert {
                kind,
                vote_count: 5,
            })
            .unwrap();
        }
        tx.send(WorkerEvent::Stopped {
            kind: WeaponKind::Blade,
            reason: StopReason::EndOfStream,
        })
        .unwrap();
        drop(tx);

        let acked = Mutex::new(Vec::new());
        let alerts = report_events(rx, |kind| acked.lock().unwrap().push(kind));
        assert_eq!(alerts, 3);
        assert_eq!(
            acked.into_inner().unwrap(),
            vec![WeaponKind::Blade, WeaponKind::Firearm, WeaponKind::Blade]
        );
    }

    #[test]
    fn crop_classifier_registry_finds_firearms_on_the_person() {
        let registry = demo_registry(true).unwrap();
        let firearm = registry
            .backend_for_capability(DetectionCapability::FirearmDetection)
            .unwrap();
        let mut firearm = firearm.lock().unwrap();
        assert_eq!(firearm.name(), "upper-body-classifier");

        let frame = Frame::filled(64, 48, [0, 0, 0]).unwrap();
        let found = firearm.detect(&frame).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class, ObjectClass::Firearm);
        assert!(firearm.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn default_registry_scripts_every_kind() {
        let registry = demo_registry(false).unwrap();
        for kind in WeaponKind::ALL {
            assert!(registry.backend_for_capability(kind.capability()).is_ok());
        }
        assert!(registry.list().contains(&"scripted-firearm".to_string()));
    }
}
