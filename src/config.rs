use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::risk::DEFAULT_MOTION_NORMALIZATION;
use crate::votes::{DEFAULT_ALERT_THRESHOLD, DEFAULT_STALENESS_WINDOW_MS};

const DEFAULT_RISK_THRESHOLD: f64 = 0.6;
const DEFAULT_HUMAN_MIN_SCORE: f32 = 0.3;
const DEFAULT_WEAPON_MIN_SCORE: f32 = 0.5;
const DEFAULT_SCALE: f64 = 0.3;
const DEFAULT_GAMMA: f64 = 2.0;
const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_FLOW_STRIDE: u32 = 4;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SentinelConfigFile {
    session: Option<SessionConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    source: Option<SourceConfigFile>,
    motion: Option<MotionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    staleness_window_ms: Option<u64>,
    alert_threshold: Option<usize>,
    risk_threshold: Option<f64>,
    motion_normalization: Option<f64>,
    human_min_score: Option<f32>,
    weapon_min_score: Option<f32>,
    annotate: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreprocessConfigFile {
    scale: Option<f64>,
    gamma: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MotionConfigFile {
    stride: Option<u32>,
}

/// Tunables of one detector session. Validated before a session is built.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Longest allowed gap between votes before the ledger is emptied.
    pub staleness_window_ms: u64,
    /// Votes needed to raise an alert.
    pub alert_threshold: usize,
    /// Fused risk a human must strictly exceed to cast a vote.
    pub risk_threshold: f64,
    /// Motion magnitude mapped to full motion evidence.
    pub motion_normalization: f64,
    /// Person detections below this confidence are ignored.
    pub human_min_score: f32,
    /// Weapon detections below this confidence are ignored.
    pub weapon_min_score: f32,
    pub preprocess: PreprocessSettings,
    /// Produce the annotated debug image with every report.
    pub annotate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessSettings {
    pub scale: f64,
    pub gamma: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: DEFAULT_STALENESS_WINDOW_MS,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            motion_normalization: DEFAULT_MOTION_NORMALIZATION,
            human_min_score: DEFAULT_HUMAN_MIN_SCORE,
            weapon_min_score: DEFAULT_WEAPON_MIN_SCORE,
            preprocess: PreprocessSettings::default(),
            annotate: true,
        }
    }
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.staleness_window_ms == 0 {
            return Err(anyhow!("staleness_window_ms must be greater than zero"));
        }
        if self.alert_threshold == 0 {
            return Err(anyhow!("alert_threshold must be at least one vote"));
        }
        check_unit("risk_threshold", self.risk_threshold)?;
        check_unit("human_min_score", self.human_min_score as f64)?;
        check_unit("weapon_min_score", self.weapon_min_score as f64)?;
        if !self.motion_normalization.is_finite() || self.motion_normalization <= 0.0 {
            return Err(anyhow!("motion_normalization must be a positive number"));
        }
        let scale = self.preprocess.scale;
        if !scale.is_finite() || scale <= 0.0 || scale > 1.0 {
            return Err(anyhow!("preprocess scale must be within (0, 1]"));
        }
        if !self.preprocess.gamma.is_finite() || self.preprocess.gamma <= 0.0 {
            return Err(anyhow!("preprocess gamma must be a positive number"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

/// Daemon configuration: session tunables plus the frame source and motion oracle.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub session: SessionConfig,
    pub source: SourceSettings,
    pub flow_stride: u32,
}

impl SentinelConfig {
    /// Load from `$SENTINEL_CONFIG` (JSON, or TOML for `*.toml`), apply
    /// `SENTINEL_*` environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let defaults = SessionConfig::default();
        let session_file = file.session.unwrap_or_default();
        let preprocess_file = file.preprocess.unwrap_or_default();
        let source_file = file.source.unwrap_or_default();

        let session = SessionConfig {
            staleness_window_ms: session_file
                .staleness_window_ms
                .unwrap_or(defaults.staleness_window_ms),
            alert_threshold: session_file
                .alert_threshold
                .unwrap_or(defaults.alert_threshold),
            risk_threshold: session_file
                .risk_threshold
                .unwrap_or(defaults.risk_threshold),
            motion_normalization: session_file
                .motion_normalization
                .unwrap_or(defaults.motion_normalization),
            human_min_score: session_file
                .human_min_score
                .unwrap_or(defaults.human_min_score),
            weapon_min_score: session_file
                .weapon_min_score
                .unwrap_or(defaults.weapon_min_score),
            preprocess: PreprocessSettings {
                scale: preprocess_file.scale.unwrap_or(defaults.preprocess.scale),
                gamma: preprocess_file.gamma.unwrap_or(defaults.preprocess.gamma),
            },
            annotate: session_file.annotate.unwrap_or(defaults.annotate),
        };
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let flow_stride = file
            .motion
            .and_then(|motion| motion.stride)
            .unwrap_or(DEFAULT_FLOW_STRIDE);
        Self {
            session,
            source,
            flow_stride,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(window) = env_parse::<u64>("SENTINEL_STALENESS_WINDOW_MS")? {
            self.session.staleness_window_ms = window;
        }
        if let Some(threshold) = env_parse::<usize>("SENTINEL_ALERT_THRESHOLD")? {
            self.session.alert_threshold = threshold;
        }
        if let Some(threshold) = env_parse::<f64>("SENTINEL_RISK_THRESHOLD")? {
            self.session.risk_threshold = threshold;
        }
        if let Some(norm) = env_parse::<f64>("SENTINEL_MOTION_NORMALIZATION")? {
            self.session.motion_normalization = norm;
        }
        if let Ok(url) = std::env::var("SENTINEL_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Some(fps) = env_parse::<u32>("SENTINEL_TARGET_FPS")? {
            self.source.target_fps = fps;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.flow_stride == 0 {
            return Err(anyhow!("motion stride must be greater than zero"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, raw)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
