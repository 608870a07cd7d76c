use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Per-category violation thresholds for one assessment round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct WarningLimits {
    #[serde(alias = "tabSwitchLimit")]
    pub tab_switch: u32,
    #[serde(alias = "fullscreenExitLimit")]
    pub fullscreen_exit: u32,
    #[serde(alias = "audioWarningLimit")]
    pub audio_warning: u32,
}

impl Default for WarningLimits {
    fn default() -> Self {
        Self {
            tab_switch: 3,
            fullscreen_exit: 3,
            audio_warning: 3,
        }
    }
}

/// Tunables for the webcam signal pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VisionConfig {
    /// Capacity of every per-channel smoothing window.
    pub smoothing_window: usize,
    /// Minimum spacing between two logged detection events.
    pub event_throttle_ms: u64,
    /// Mood is evaluated at most once per this interval.
    pub mood_interval_ms: u64,
    /// Object detection is dispatched on every Nth frame.
    pub object_every_n_frames: u64,
    pub object_min_score: f32,
    /// Frames are shrunk to fit this square before object detection.
    pub object_input_size: u32,
    pub max_log_entries: usize,
    pub ready_timeout_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            event_throttle_ms: 1000,
            mood_interval_ms: 1000,
            object_every_n_frames: 10,
            object_min_score: 0.5,
            object_input_size: 320,
            max_log_entries: 1000,
            ready_timeout_ms: 10_000,
        }
    }
}

/// Configuration handed to the proctoring core by the surrounding system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctorConfig {
    /// Fullscreen-exit grace period before forced disqualification.
    pub countdown_seconds: u32,
    #[serde(flatten)]
    pub limits: WarningLimits,
    pub disqualify_route: String,
    pub vision: VisionConfig,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 10,
            limits: WarningLimits::default(),
            disqualify_route: "/disqualified".into(),
            vision: VisionConfig::default(),
        }
    }
}

impl ProctorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read proctor config from {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid proctor config in {}", path.display()))
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents).context("malformed config json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.countdown_seconds == 0 {
            bail!("countdownSeconds must be greater than zero");
        }
        if self.vision.smoothing_window == 0 {
            bail!("vision.smoothingWindow must be greater than zero");
        }
        if self.vision.object_every_n_frames == 0 {
            bail!("vision.objectEveryNFrames must be greater than zero");
        }
        if self.vision.max_log_entries == 0 {
            bail!("vision.maxLogEntries must be greater than zero");
        }
        if self.vision.object_input_size == 0 {
            bail!("vision.objectInputSize must be greater than zero");
        }
        if !self.disqualify_route.starts_with('/') {
            bail!("disqualifyRoute must be an absolute path");
        }
        Ok(())
    }
}
