//! Audio timeline mixing.
//!
//! The mixed track is `[intro audio] + narration + [outro audio]`. Bookend
//! audio is leveled to the narration's mean volume and fitted to the
//! bookend's picture length, so audio and video stay aligned segment by
//! segment. A bookend without usable audio contributes silence of the same
//! length; a bookend whose length cannot be measured is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_planning::filter_graph::concat_list;
use reelsmith_timeline_model::config::TimelineConfig;
use reelsmith_timeline_model::job::{MixFallback, MixFallbackAction};
use reelsmith_timeline_model::media::{AudioSegment, BookendClip, BookendKind};

use crate::probe::{mean_volume, probe_media};
use crate::tool::{CancelSignal, FfmpegCommand, ToolRunner};
use crate::workspace::JobWorkspace;

/// The mixed narration track and the segment lengths it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudio {
    pub path: PathBuf,
    /// Zero when there is no intro or it was dropped.
    pub intro_duration: f64,
    pub outro_duration: f64,
    pub narration_duration: f64,
    pub fallbacks: Vec<MixFallback>,
}

impl MixedAudio {
    pub fn total_duration(&self) -> f64 {
        self.intro_duration + self.narration_duration + self.outro_duration
    }

    pub fn has_bookend(&self, kind: BookendKind) -> bool {
        match kind {
            BookendKind::Intro => self.intro_duration > 0.0,
            BookendKind::Outro => self.outro_duration > 0.0,
        }
    }
}

/// One prepared bookend segment.
struct BookendAudio {
    path: PathBuf,
    duration: f64,
}

/// Builds the job's single audio track.
#[derive(Clone)]
pub struct AudioTimelineMixer {
    runner: Arc<dyn ToolRunner>,
    sample_rate: u32,
}

impl std::fmt::Debug for AudioTimelineMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTimelineMixer")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl AudioTimelineMixer {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &TimelineConfig) -> Self {
        Self {
            runner,
            sample_rate: config.audio_sample_rate,
        }
    }

    /// Mix narration with optional bookends.
    ///
    /// Narration problems are fatal. Bookend problems are recovered and
    /// recorded in [`MixedAudio::fallbacks`].
    pub async fn mix(
        &self,
        workspace: &JobWorkspace,
        narration: &AudioSegment,
        intro: Option<&BookendClip>,
        outro: Option<&BookendClip>,
        cancel: &CancelSignal,
    ) -> ReelResult<MixedAudio> {
        let narration_duration = match narration.measured_duration {
            Some(d) if d > 0.0 => d,
            _ => probe_media(self.runner.as_ref(), &narration.path, cancel)
                .await?
                .duration()
                .ok_or_else(|| {
                    ReelError::render(format!(
                        "narration {} has no measurable duration",
                        narration.path.display()
                    ))
                })?,
        };

        let reference = match mean_volume(self.runner.as_ref(), &narration.path, cancel).await {
            Ok(level) if level.is_finite() => Some(level),
            Ok(_) => None,
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Narration level unknown, bookend audio left unleveled");
                None
            }
        };

        let mut fallbacks = Vec::new();
        let intro = match intro {
            Some(clip) => {
                self.bookend(workspace, BookendKind::Intro, clip, reference, &mut fallbacks, cancel)
                    .await?
            }
            None => None,
        };
        let outro = match outro {
            Some(clip) => {
                self.bookend(workspace, BookendKind::Outro, clip, reference, &mut fallbacks, cancel)
                    .await?
            }
            None => None,
        };

        let narration_wav = workspace.file("narration", "wav");
        let command = self
            .pcm(FfmpegCommand::new(&narration_wav).input(&narration.path).no_video());
        self.runner.run(&command.into_invocation(), cancel).await?;

        let segments: Vec<PathBuf> = intro
            .iter()
            .map(|s| s.path.clone())
            .chain(std::iter::once(narration_wav.clone()))
            .chain(outro.iter().map(|s| s.path.clone()))
            .collect();

        let path = if segments.len() == 1 {
            narration_wav
        } else {
            self.concat(workspace, &segments, cancel).await?
        };

        let mixed = MixedAudio {
            path,
            intro_duration: intro.as_ref().map_or(0.0, |s| s.duration),
            outro_duration: outro.as_ref().map_or(0.0, |s| s.duration),
            narration_duration,
            fallbacks,
        };
        tracing::info!(
            intro_secs = mixed.intro_duration,
            narration_secs = mixed.narration_duration,
            outro_secs = mixed.outro_duration,
            fallbacks = mixed.fallbacks.len(),
            "Mixed audio timeline"
        );
        Ok(mixed)
    }

    async fn bookend(
        &self,
        workspace: &JobWorkspace,
        kind: BookendKind,
        clip: &BookendClip,
        reference: Option<f64>,
        fallbacks: &mut Vec<MixFallback>,
        cancel: &CancelSignal,
    ) -> ReelResult<Option<BookendAudio>> {
        let info = match probe_media(self.runner.as_ref(), &clip.path, cancel).await {
            Ok(info) => info,
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                record(fallbacks, kind, MixFallbackAction::Dropped, err.to_string());
                return Ok(None);
            }
        };
        let Some(duration) = info.picture_duration() else {
            record(
                fallbacks,
                kind,
                MixFallbackAction::Dropped,
                "duration could not be measured".to_string(),
            );
            return Ok(None);
        };

        let output = workspace.file(kind.as_str(), "wav");
        if info.has_audio {
            match self
                .extract(&clip.path, &output, duration, reference, cancel)
                .await
            {
                Ok(()) => return Ok(Some(BookendAudio { path: output, duration })),
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => {
                    let err = ReelError::mix(format!("{kind} audio extraction failed: {err}"));
                    record(fallbacks, kind, MixFallbackAction::Silence, err.to_string());
                }
            }
        } else {
            record(
                fallbacks,
                kind,
                MixFallbackAction::Silence,
                "no audio stream".to_string(),
            );
        }

        self.silence(&output, duration, cancel).await?;
        Ok(Some(BookendAudio { path: output, duration }))
    }

    async fn extract(
        &self,
        clip: &Path,
        output: &Path,
        duration: f64,
        reference: Option<f64>,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        let gain = match reference {
            Some(reference) => match mean_volume(self.runner.as_ref(), clip, cancel).await {
                Ok(level) if level.is_finite() => reference - level,
                Ok(_) => 0.0,
                Err(err) if is_fatal(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(clip = %clip.display(), error = %err, "Bookend level unknown, no gain");
                    0.0
                }
            },
            None => 0.0,
        };

        let command = self.pcm(
            FfmpegCommand::new(output)
                .input(clip)
                .no_video()
                .audio_filter(format!("volume={gain:.2}dB,apad,atrim=0:{duration:.3}")),
        );
        tracing::debug!(clip = %clip.display(), gain_db = gain, duration, "Extracting bookend audio");
        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(())
    }

    /// Silent PCM of exactly `duration` seconds.
    async fn silence(&self, output: &Path, duration: f64, cancel: &CancelSignal) -> ReelResult<()> {
        let command = self.pcm(
            FfmpegCommand::new(output)
                .lavfi(format!("anullsrc=r={}:cl=stereo", self.sample_rate))
                .duration(duration),
        );
        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(())
    }

    /// Losslessly join PCM segments in order.
    async fn concat(
        &self,
        workspace: &JobWorkspace,
        segments: &[PathBuf],
        cancel: &CancelSignal,
    ) -> ReelResult<PathBuf> {
        let list = workspace.write_text("audio_list", "txt", &concat_list(segments))?;
        let output = workspace.file("mixed", "wav");
        let command = FfmpegCommand::new(&output)
            .input_with(["-f", "concat", "-safe", "0"], &list)
            .audio_codec("copy");
        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(output)
    }

    /// Common PCM layout of every segment.
    fn pcm(&self, command: FfmpegCommand) -> FfmpegCommand {
        command
            .output_args(["-ac", "2", "-ar"])
            .output_arg(self.sample_rate.to_string())
            .audio_codec("pcm_s16le")
    }
}

fn record(fallbacks: &mut Vec<MixFallback>, kind: BookendKind, action: MixFallbackAction, reason: String) {
    tracing::warn!(segment = %kind, ?action, reason = %reason, "Bookend audio fallback");
    fallbacks.push(MixFallback {
        segment: kind,
        action,
        reason,
    });
}

/// Errors that end the job instead of triggering a bookend fallback.
pub(crate) fn is_fatal(err: &ReelError) -> bool {
    err.is_interruption() || matches!(err, ReelError::ToolNotFound { .. })
}
