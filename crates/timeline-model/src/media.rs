//! Audio segments, bookend clips and overlays.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An audio track with its measured duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Path to the audio (or audio-bearing) file.
    pub path: PathBuf,

    /// Duration measured by probing, when known.
    #[serde(default)]
    pub measured_duration: Option<f64>,
}

impl AudioSegment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            measured_duration: None,
        }
    }
}

/// An intro or outro video placed around the narrated scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookendClip {
    /// Path to the video file.
    pub path: PathBuf,

    /// Caption shown while the clip plays. `None` uses the configured
    /// fallback text.
    #[serde(default)]
    pub caption: Option<String>,
}

/// Which side of the narration a bookend sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookendKind {
    Intro,
    Outro,
}

impl BookendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Outro => "outro",
        }
    }
}

impl std::fmt::Display for BookendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-gated image composited above the base timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySpec {
    /// Image to overlay (PNG with alpha recommended).
    pub path: PathBuf,

    /// Visible from (seconds, output timeline).
    pub start: f64,

    /// Visible until (seconds, output timeline).
    pub end: f64,

    /// Scaled width in pixels; height keeps the aspect ratio.
    #[serde(default = "default_overlay_width")]
    pub width: u32,

    /// Vertical center in pixels; horizontally the overlay is centered.
    #[serde(default = "default_overlay_y_center")]
    pub y_center: i32,

    /// Motion while visible.
    #[serde(default)]
    pub motion: OverlayMotion,
}

fn default_overlay_width() -> u32 {
    700
}

fn default_overlay_y_center() -> i32 {
    750
}

/// Parametric motion of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OverlayMotion {
    /// Vertical sinusoidal float: `amplitude * sin(2π · frequency · t)`.
    Float { amplitude: f64, frequency: f64 },
    /// No motion.
    Static,
}

impl Default for OverlayMotion {
    fn default() -> Self {
        Self::Float {
            amplitude: 20.0,
            frequency: 0.5,
        }
    }
}

impl OverlaySpec {
    pub fn new(path: impl Into<PathBuf>, start: f64, end: f64) -> Self {
        Self {
            path: path.into(),
            start,
            end,
            width: default_overlay_width(),
            y_center: default_overlay_y_center(),
            motion: OverlayMotion::default(),
        }
    }

    /// Visible span in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
