//! Per-job timeline configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use reelsmith_common::config::RenderDefaults;
use reelsmith_common::error::{ReelError, ReelResult};

/// Canvas, normalization and encoder settings for one job.
///
/// Built once per job and never mutated afterwards; every clip, cue
/// script and graph produced for the job agrees with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Canvas width (pixels, even).
    pub width: u32,

    /// Canvas height (pixels, even).
    pub height: u32,

    /// Frame rate of every clip and the output.
    pub fps: u32,

    /// Pixel format of every clip and the output.
    pub pixel_format: String,

    /// Overlap between adjacent scenes. Zero means plain concatenation.
    pub crossfade_secs: f64,

    /// Fade in and out applied to every normalized clip.
    pub fade_secs: f64,

    /// Which H.264 encoder the final render uses.
    pub encoder: EncoderPreference,

    /// H.264 profile of normalized clips.
    pub video_profile: String,

    /// H.264 level of normalized clips.
    pub video_level: String,

    /// x264 preset for normalization passes.
    pub normalize_preset: String,

    /// x264 preset for the final software render.
    pub render_preset: String,

    /// Quality target of the final render (CRF / global_quality).
    pub quality: u8,

    /// AAC bitrate of the final render.
    pub audio_bitrate: String,

    /// Sample rate of every intermediate audio segment.
    pub audio_sample_rate: u32,

    /// Background color for placeholder clips (ffmpeg color syntax).
    pub placeholder_color: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            pixel_format: "yuv420p".to_string(),
            crossfade_secs: 0.0,
            fade_secs: 0.5,
            encoder: EncoderPreference::Auto,
            video_profile: "main".to_string(),
            video_level: "4.0".to_string(),
            normalize_preset: "fast".to_string(),
            render_preset: "medium".to_string(),
            quality: 23,
            audio_bitrate: "192k".to_string(),
            audio_sample_rate: 48_000,
            placeholder_color: "0x1a1a2e".to_string(),
        }
    }
}

impl TimelineConfig {
    /// Build from application defaults and validate.
    pub fn from_defaults(defaults: &RenderDefaults) -> ReelResult<Self> {
        let encoder = defaults
            .encoder
            .parse::<EncoderPreference>()
            .map_err(ReelError::config)?;
        let config = Self {
            width: defaults.width,
            height: defaults.height,
            fps: defaults.fps,
            crossfade_secs: defaults.crossfade_secs,
            fade_secs: defaults.fade_secs,
            encoder,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no encoder run could satisfy.
    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::config(format!(
                "invalid canvas {}x{}: dimensions must be positive",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ReelError::config(format!(
                "invalid canvas {}x{}: {} requires even dimensions",
                self.width, self.height, self.pixel_format
            )));
        }
        if self.fps == 0 {
            return Err(ReelError::config("fps must be positive"));
        }
        if !self.fade_secs.is_finite() || self.fade_secs < 0.0 {
            return Err(ReelError::config("fade duration must be non-negative"));
        }
        if !self.crossfade_secs.is_finite() || self.crossfade_secs < 0.0 {
            return Err(ReelError::config("crossfade duration must be non-negative"));
        }
        if self.audio_sample_rate == 0 {
            return Err(ReelError::config("audio sample rate must be positive"));
        }
        Ok(())
    }

    /// Composition mode implied by the crossfade setting.
    pub fn composition_mode(&self) -> CompositionMode {
        if self.crossfade_secs > 0.0 {
            CompositionMode::Crossfade {
                duration: self.crossfade_secs,
            }
        } else {
            CompositionMode::Sequential
        }
    }

    /// Duration of one frame.
    pub fn frame_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }
}

/// How normalized clips are joined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CompositionMode {
    /// Clips back to back.
    Sequential,
    /// Adjacent clips overlap by `duration` seconds.
    Crossfade { duration: f64 },
}

/// Encoder selection for the final render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreference {
    /// Hardware when the probe finds it, software otherwise.
    #[default]
    Auto,
    /// Hardware only; fails if unavailable.
    Hardware,
    /// Software (libx264) only.
    Software,
}

impl FromStr for EncoderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hardware" | "hw" | "qsv" => Ok(Self::Hardware),
            "software" | "sw" | "x264" => Ok(Self::Software),
            other => Err(format!(
                "Unknown encoder preference: {other}. Use: auto, hardware, software"
            )),
        }
    }
}
