//! Single reader for a shared camera.
//!
//! Only the dispatcher ever calls `next_frame`. Each tick it reads exactly one
//! frame and hands the same `SharedFrame` to every subscribed worker, so all
//! workers see an identical stream regardless of how fast each one runs.
//! End of stream and source failures are broadcast as distinct messages so
//! workers can tell a finished feed from a broken camera.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::SharedFrame;

/// Message a worker receives per tick.
#[derive(Clone, Debug)]
pub enum FrameMessage {
    Frame(SharedFrame),
    /// The source is exhausted or the dispatcher was stopped.
    EndOfStream,
    /// The source returned an error; no further frames will follow.
    SourceFailed(String),
}

impl FrameMessage {
    pub fn frame(&self) -> Option<&SharedFrame> {
        match self {
            FrameMessage::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

pub struct FrameDispatcher {
    source: Box<dyn FrameSource>,
    outputs: Vec<SyncSender<FrameMessage>>,
    ticks: u64,
}

impl FrameDispatcher {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            outputs: Vec::new(),
            ticks: 0,
        }
    }

    /// Register a worker. `capacity` bounds how far it may lag behind the camera;
    /// a full queue blocks the dispatcher.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<FrameMessage> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        self.outputs.push(tx);
        rx
    }

    pub fn subscribers(&self) -> usize {
        self.outputs.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.stats()
    }

    /// Read one frame and fan it out.
    ///
    /// Returns `Ok(true)` while frames are flowing and at least one worker is
    /// still listening, `Ok(false)` at end of stream or when every worker has
    /// gone. Source errors are broadcast as `SourceFailed` and then returned.
    pub fn tick(&mut self) -> Result<bool> {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => Arc::new(frame),
            Ok(None) => {
                let stats = self.source.stats();
                log::info!(
                    "frame source {} exhausted after {} ticks ({} frames captured)",
                    stats.url,
                    self.ticks,
                    stats.frames_captured
                );
                self.broadcast(FrameMessage::EndOfStream);
                return Ok(false);
            }
            Err(err) => {
                log::error!("frame source {} failed: {:#}", self.source.stats().url, err);
                self.broadcast(FrameMessage::SourceFailed(format!("{:#}", err)));
                return Err(err);
            }
        };
        self.ticks += 1;
        self.broadcast(FrameMessage::Frame(frame));
        Ok(!self.outputs.is_empty())
    }

    /// Tick until end of stream, `stop` is raised, or every worker has left.
    /// `pace` sets the minimum time per tick.
    pub fn run(&mut self, stop: &AtomicBool, pace: Option<Duration>) -> Result<u64> {
        self.source.connect()?;
        while !stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            if !self.tick()? {
                return Ok(self.ticks);
            }
            if let Some(pace) = pace {
                if let Some(rest) = pace.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }
        log::info!("dispatcher stopped after {} ticks", self.ticks);
        self.broadcast(FrameMessage::EndOfStream);
        Ok(self.ticks)
    }

    fn broadcast(&mut self, message: FrameMessage) {
        // Disconnected workers are dropped from the fan-out.
        self.outputs.retain(|tx| tx.send(message.clone()).is_ok());
    }
}
