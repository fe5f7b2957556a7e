//! Render jobs and their outcomes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cue::SubtitleCue;
use crate::media::{AudioSegment, BookendClip, BookendKind, OverlaySpec};
use crate::scene::{Scene, VisualEffect};

/// Prefix carried by every job id and therefore every temp path.
pub const JOB_ID_PREFIX: &str = "reel";

/// How narration timing is known when a job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NarrationTiming {
    /// Measured duration of each synthesized chunk, one per scene.
    PerChunk(Vec<f64>),
    /// Only the total narration duration.
    Total(f64),
    /// Nothing yet; use the duration measured from the narration file.
    Measured,
}

/// Where the main caption cues come from.
#[derive(Debug, Clone, PartialEq)]
pub enum CueInput {
    /// Derive cues from each scene's narration and time slot.
    FromNarration,
    /// Cues given directly, relative to the narration start.
    Inline(Vec<SubtitleCue>),
    /// Cues in an `.srt` or `.ass` file, relative to the narration start.
    File(PathBuf),
}

/// Whether intermediates survive the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempPolicy {
    pub keep_on_success: bool,
    pub keep_on_failure: bool,
}

impl Default for TempPolicy {
    fn default() -> Self {
        Self {
            keep_on_success: false,
            keep_on_failure: true,
        }
    }
}

/// One production run.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Unique id; prefixes the job's temp directory and every file in it.
    pub job_id: String,

    /// Scenes in output order.
    pub scenes: Vec<Scene>,

    /// Narration track.
    pub narration: AudioSegment,

    /// Narration timing available up front.
    pub narration_timing: NarrationTiming,

    pub intro: Option<BookendClip>,
    pub outro: Option<BookendClip>,

    /// Main caption source.
    pub cues: CueInput,

    /// Overlays on the output timeline.
    pub overlays: Vec<OverlaySpec>,

    /// Effect for images whose scene does not name one.
    pub default_effect: VisualEffect,

    /// Final video path.
    pub output_path: PathBuf,

    pub temp: TempPolicy,
}

impl RenderJob {
    pub fn new(
        scenes: Vec<Scene>,
        narration: AudioSegment,
        narration_timing: NarrationTiming,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            job_id: new_job_id(),
            scenes,
            narration,
            narration_timing,
            intro: None,
            outro: None,
            cues: CueInput::FromNarration,
            overlays: Vec::new(),
            default_effect: VisualEffect::default(),
            output_path: output_path.into(),
            temp: TempPolicy::default(),
        }
    }

    pub fn bookend(&self, kind: BookendKind) -> Option<&BookendClip> {
        match kind {
            BookendKind::Intro => self.intro.as_ref(),
            BookendKind::Outro => self.outro.as_ref(),
        }
    }
}

/// Generate a job id such as `reel-1f3a9c2e`.
pub fn new_job_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{JOB_ID_PREFIX}-{}", &id[..8])
}

/// Final classification of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    /// Every scene used its own asset.
    Complete,
    /// At least one fallback stood in for a failed input.
    Degraded,
}

/// What filled a scene slot whose own asset failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubstituteSource {
    /// The nearest earlier scene's normalized clip, re-timed.
    PreviousClip { scene_index: usize },
    /// The nearest later scene's normalized clip (leading failures).
    NextClip { scene_index: usize },
    /// A solid-color clip.
    Placeholder,
}

/// One recorded scene fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    pub scene_index: usize,
    pub scene_id: usize,
    pub source: SubstituteSource,
    /// Error that triggered the fallback.
    pub reason: String,
}

/// What replaced a bookend part that could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixFallbackAction {
    /// Silence of the clip's video duration.
    Silence,
    /// The bookend was left out of the timeline.
    Dropped,
    /// The bookend video was replaced by a solid clip; its audio slot kept.
    PlaceholderVideo,
}

impl MixFallbackAction {
    /// Whether the action leaves the output visibly different from the plan.
    pub fn degrades(self) -> bool {
        !matches!(self, Self::Silence)
    }
}

/// One recorded bookend fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixFallback {
    pub segment: BookendKind,
    pub action: MixFallbackAction,
    pub reason: String,
}

/// Result of a finished render, also written as the job report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub job_id: String,
    pub output_path: PathBuf,
    pub status: RenderStatus,
    pub substitutions: Vec<Substitution>,
    pub mix_fallbacks: Vec<MixFallback>,

    /// Planned output duration (seconds).
    pub expected_duration: f64,

    /// Probed output duration, when the probe succeeded.
    pub measured_duration: Option<f64>,

    /// Encoder actually used.
    pub encoder: String,

    /// Wall-clock start (RFC 3339).
    pub started_at: String,
    pub elapsed_secs: f64,

    /// Temp directory left on disk, if any.
    pub retained_temp_dir: Option<PathBuf>,
}

impl RenderOutcome {
    /// Status implied by the recorded fallbacks. Bookend silence is
    /// normal operation and does not degrade a job; a dropped or blanked
    /// bookend does.
    pub fn classify(substitutions: &[Substitution], mix_fallbacks: &[MixFallback]) -> RenderStatus {
        let degraded = mix_fallbacks.iter().any(|f| f.action.degrades());
        if substitutions.is_empty() && !degraded {
            RenderStatus::Complete
        } else {
            RenderStatus::Degraded
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == RenderStatus::Degraded
    }

    /// Default report location: `<output>.report.json`.
    pub fn default_report_path(output: &Path) -> PathBuf {
        let mut name = output
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".report.json");
        output.with_file_name(name)
    }

    /// Write the outcome as pretty JSON.
    pub fn write_report(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
