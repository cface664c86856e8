//! Synthetic frame sources.
//!
//! `SyntheticSource` stands in for a camera on `stub://` URLs: a moving
//! gradient with an occasional scene change. `FrameSequence` replays a fixed
//! list of frames and then reports end of stream.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::collections::VecDeque;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Must use the `stub://` scheme.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// End of stream after this many frames; `None` runs forever.
    pub max_frames: Option<u64>,
    /// Amplitude of uniform per-pixel sensor noise.
    pub noise: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            width: 640,
            height: 480,
            max_frames: None,
            noise: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    /// Simulated scene; bumping it shifts the whole image.
    scene_state: u8,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source only serves stub:// urls, got '{}'",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be non-zero"));
        }
        Ok(Self {
            config,
            frame_count: 0,
            scene_state: 0,
            connected: false,
        })
    }

    /// Simulates a mostly static scene:
    /// - a gradient that drifts one pixel per frame
    /// - every 50th frame the scene jumps (object entering)
    fn generate_pixels(&mut self) -> Vec<u8> {
        let width = self.config.width as u64;
        let height = self.config.height as u64;

        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(37);
        }

        let mut rng = rand::thread_rng();
        let noise = self.config.noise as i16;
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let base = (x + y + self.frame_count + self.scene_state as u64) % 256;
                for channel in 0..3u64 {
                    let mut value = ((base + channel * 40) % 256) as i16;
                    if noise > 0 {
                        value += rng.gen_range(-noise..=noise);
                    }
                    pixels.push(value.clamp(0, 255) as u8);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("source {} is not connected", self.config.url));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.config.width, self.config.height).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

/// Replays prepared frames in order, then reports end of stream.
pub struct FrameSequence {
    frames: VecDeque<Frame>,
    served: u64,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            served: 0,
        }
    }
}

impl FrameSource for FrameSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.served += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.served,
            url: "sequence://".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_requires_stub_url() {
        let config = SyntheticConfig {
            url: "rtsp://camera".to_string(),
            ..SyntheticConfig::default()
        };
        assert!(SyntheticSource::new(config).is_err());
    }

    #[test]
    fn synthetic_source_must_connect_first() {
        let mut source = SyntheticSource::new(SyntheticConfig::default()).unwrap();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn synthetic_source_ends_after_max_frames() {
        let config = SyntheticConfig {
            width: 8,
            height: 6,
            max_frames: Some(2),
            ..SyntheticConfig::default()
        };
        let mut source = SyntheticSource::new(config).unwrap();
        source.connect().unwrap();

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (8, 6));
        let second = source.next_frame().unwrap().unwrap();
        assert_ne!(first, second);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 2);
    }

    #[test]
    fn frame_sequence_replays_then_ends() {
        let a = Frame::filled(2, 2, [1, 1, 1]).unwrap();
        let b = Frame::filled(2, 2, [2, 2, 2]).unwrap();
        let mut source = FrameSequence::new(vec![a.clone(), b.clone()]);
        assert_eq!(source.next_frame().unwrap(), Some(a));
        assert_eq!(source.next_frame().unwrap(), Some(b));
        assert_eq!(source.next_frame().unwrap(), None);
        assert_eq!(source.stats().frames_captured, 2);
    }
}
