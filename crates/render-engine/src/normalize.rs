//! Asset normalization.
//!
//! Every scene asset becomes a clip of exactly its slot duration, at the
//! canvas size, with no audio. Normalization is two passes: a raw pass that
//! shapes the asset (image motion, or video loop/trim and crop) and a
//! mandatory re-encode that pins codec, profile, level, pixel format and
//! frame rate and adds the fades. Clips only join cleanly after the second
//! pass, so its failure is an asset failure like any other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_common::timecode::secs_to_frames;
use reelsmith_timeline_model::config::TimelineConfig;
use reelsmith_timeline_model::media::BookendKind;
use reelsmith_timeline_model::scene::VisualEffect;

use crate::probe::probe_media;
use crate::tool::{CancelSignal, FfmpegCommand, ToolRunner};
use crate::workspace::JobWorkspace;

/// Timeline slot a clip is normalized for; decides the file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipSlot {
    Scene(usize),
    Bookend(BookendKind),
    /// Background of a caption preview.
    Preview,
}

impl ClipSlot {
    /// `<job>_<stage>_003.mp4` for scenes, `<job>_<stage>_intro.mp4` for bookends.
    pub fn path(self, workspace: &JobWorkspace, stage: &str) -> PathBuf {
        match self {
            Self::Scene(index) => workspace.slot_file(stage, index, "mp4"),
            Self::Bookend(kind) => workspace.file(&format!("{stage}_{kind}"), "mp4"),
            Self::Preview => workspace.file(&format!("{stage}_preview"), "mp4"),
        }
    }
}

impl std::fmt::Display for ClipSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scene(index) => write!(f, "scene {index}"),
            Self::Bookend(kind) => write!(f, "{kind}"),
            Self::Preview => f.write_str("preview"),
        }
    }
}

/// Turns scene assets into uniform clips.
#[derive(Clone)]
pub struct AssetNormalizer {
    runner: Arc<dyn ToolRunner>,
    config: TimelineConfig,
}

impl std::fmt::Debug for AssetNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetNormalizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssetNormalizer {
    pub fn new(runner: Arc<dyn ToolRunner>, config: TimelineConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Normalize `asset` for `slot`.
    ///
    /// Failures other than cancellation, timeout or a missing tool come
    /// back as [`ReelError::Asset`].
    pub async fn normalize(
        &self,
        workspace: &JobWorkspace,
        slot: ClipSlot,
        asset: &Path,
        target_duration: f64,
        is_image: bool,
        effect: VisualEffect,
        cancel: &CancelSignal,
    ) -> ReelResult<PathBuf> {
        if !target_duration.is_finite() || target_duration <= 0.0 {
            return Err(ReelError::asset(format!(
                "{slot}: invalid target duration {target_duration}"
            )));
        }
        if !asset.exists() {
            return Err(ReelError::asset(format!(
                "{slot}: asset not found: {}",
                asset.display()
            )));
        }

        let raw = slot.path(workspace, "raw");
        let raw_result = if is_image {
            self.raw_image(asset, &raw, target_duration, effect, cancel).await
        } else {
            self.raw_video(asset, &raw, target_duration, cancel).await
        };
        raw_result.map_err(|e| as_asset_error(slot, "raw pass", e))?;

        let normalized = slot.path(workspace, "norm");
        self.second_pass(&raw, &normalized, target_duration, cancel)
            .await
            .map_err(|e| as_asset_error(slot, "second pass", e))?;

        tracing::debug!(
            slot = %slot,
            asset = %asset.display(),
            target_duration,
            is_image,
            "Normalized scene asset"
        );
        Ok(normalized)
    }

    /// Re-time an already normalized clip into another slot.
    pub async fn retime(
        &self,
        workspace: &JobWorkspace,
        slot: ClipSlot,
        clip: &Path,
        target_duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<PathBuf> {
        self.normalize(
            workspace,
            slot,
            clip,
            target_duration,
            false,
            VisualEffect::Static,
            cancel,
        )
        .await
    }

    /// Solid-color clip of exactly `duration` for `slot`.
    pub async fn placeholder(
        &self,
        workspace: &JobWorkspace,
        slot: ClipSlot,
        duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<PathBuf> {
        let c = &self.config;
        let output = slot.path(workspace, "fill");
        let command = FfmpegCommand::new(&output)
            .lavfi(format!(
                "color=c={}:s={}x{}:r={}:d={:.3}",
                c.placeholder_color, c.width, c.height, c.fps, duration
            ))
            .output_args(self.final_codec_args())
            .duration(duration);
        self.runner.run(&command.into_invocation(), cancel).await?;
        tracing::debug!(slot = %slot, duration, "Created placeholder clip");
        Ok(output)
    }

    async fn raw_image(
        &self,
        image: &Path,
        output: &Path,
        duration: f64,
        effect: VisualEffect,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        let frames = secs_to_frames(duration, self.config.fps).max(1);
        let command = match effect {
            // zoompan emits `d` frames per input frame, so the still is read once.
            VisualEffect::Zoom | VisualEffect::KenBurns => FfmpegCommand::new(output).input(image),
            VisualEffect::Pan | VisualEffect::Static => FfmpegCommand::new(output).input_with(
                ["-loop".to_string(), "1".to_string(), "-framerate".to_string(), self.config.fps.to_string()],
                image,
            ),
        }
        .video_filter(image_filter(&self.config, effect, frames))
        .duration(duration)
        .no_audio()
        .output_args(self.raw_codec_args());

        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(())
    }

    async fn raw_video(
        &self,
        video: &Path,
        output: &Path,
        duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        let source_duration = probe_media(self.runner.as_ref(), video, cancel)
            .await?
            .picture_duration()
            .ok_or_else(|| ReelError::asset(format!("no duration for {}", video.display())))?;

        let loops = loop_count(source_duration, duration);
        let options = if loops > 0 {
            vec!["-stream_loop".to_string(), loops.to_string()]
        } else {
            Vec::new()
        };

        let (w, h) = (self.config.width, self.config.height);
        let command = FfmpegCommand::new(output)
            .input_with(options, video)
            .video_filter(format!(
                "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,setpts=PTS-STARTPTS"
            ))
            .duration(duration)
            .no_audio()
            .output_args(self.raw_codec_args());

        tracing::debug!(
            source = %video.display(),
            source_duration,
            target = duration,
            loops,
            "Fitting video to slot"
        );
        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(())
    }

    async fn second_pass(
        &self,
        raw: &Path,
        output: &Path,
        duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        let command = FfmpegCommand::new(output)
            .input(raw)
            .video_filter(second_pass_filter(&self.config, duration))
            .output_args(self.final_codec_args())
            .no_audio()
            .duration(duration);
        self.runner.run(&command.into_invocation(), cancel).await?;
        Ok(())
    }

    fn raw_codec_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.config.normalize_preset.clone(),
            "-pix_fmt".to_string(),
            self.config.pixel_format.clone(),
        ]
    }

    /// The uniform encoding every joined clip shares.
    fn final_codec_args(&self) -> Vec<String> {
        let c = &self.config;
        vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-profile:v".to_string(),
            c.video_profile.clone(),
            "-level".to_string(),
            c.video_level.clone(),
            "-preset".to_string(),
            c.normalize_preset.clone(),
            "-crf".to_string(),
            c.quality.to_string(),
            "-r".to_string(),
            c.fps.to_string(),
            "-pix_fmt".to_string(),
            c.pixel_format.clone(),
        ]
    }
}

/// How many extra passes of a `source`-long video fill `target`.
pub fn loop_count(source: f64, target: f64) -> u32 {
    if source <= 0.0 || source >= target {
        0
    } else {
        (target / source) as u32 + 1
    }
}

fn even(value: u32) -> u32 {
    value + value % 2
}

/// Motion filter for a still image, driven by the output frame index.
pub fn image_filter(config: &TimelineConfig, effect: VisualEffect, frames: u64) -> String {
    let (w, h, fps) = (config.width, config.height, config.fps);
    let motion = match effect {
        VisualEffect::Zoom => format!(
            "scale=-2:{},zoompan=z='min(1+0.3*on/{frames},1.3)':d={frames}:\
             x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={w}x{h}:fps={fps}",
            h * 2
        ),
        VisualEffect::KenBurns => format!(
            "scale=-2:{},zoompan=z='max(1.5-0.5*on/{frames},1.001)':d={frames}:\
             x='iw/2-(iw/zoom/2)+sin(on/100)*20':y='ih/2-(ih/zoom/2)':s={w}x{h}:fps={fps}",
            h * 2
        ),
        VisualEffect::Pan => format!(
            "scale={}:{h}:force_original_aspect_ratio=increase,\
             crop={w}:{h}:x='min((in_w-out_w)*n/{frames},in_w-out_w)':y='(in_h-out_h)/2'",
            even(w * 2)
        ),
        VisualEffect::Static => {
            format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
        }
    };
    format!("{motion},setsar=1,format={}", config.pixel_format)
}

/// Canvas fit plus fade in/out. Fades never exceed half the clip.
pub fn second_pass_filter(config: &TimelineConfig, duration: f64) -> String {
    let (w, h) = (config.width, config.height);
    let mut filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={}",
        config.fps
    );
    let fade = config.fade_secs.min(duration / 2.0);
    if fade > 0.0 {
        filter.push_str(&format!(
            ",fade=t=in:st=0:d={fade:.3},fade=t=out:st={:.3}:d={fade:.3}",
            duration - fade
        ));
    }
    filter.push_str(&format!(",format={}", config.pixel_format));
    filter
}

fn as_asset_error(slot: ClipSlot, stage: &str, err: ReelError) -> ReelError {
    match err {
        ReelError::Cancelled | ReelError::Timeout(_) | ReelError::ToolNotFound { .. } => err,
        ReelError::Asset { .. } => err,
        other => {
            tracing::warn!(slot = %slot, stage, error = %other, "Normalization failed");
            ReelError::asset(format!("{slot}: {stage} failed: {other}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_count() {
        assert_eq!(loop_count(10.0, 4.0), 0);
        assert_eq!(loop_count(4.0, 4.0), 0);
        assert_eq!(loop_count(3.0, 7.0), 3);
        assert_eq!(loop_count(0.0, 7.0), 0);
    }

    #[test]
    fn test_image_filters_target_canvas() {
        let config = TimelineConfig::default();
        for effect in [
            VisualEffect::Zoom,
            VisualEffect::Pan,
            VisualEffect::KenBurns,
            VisualEffect::Static,
        ] {
            let filter = image_filter(&config, effect, 90);
            assert!(filter.ends_with(",setsar=1,format=yuv420p"), "{filter}");
        }
        let zoom = image_filter(&config, VisualEffect::Zoom, 90);
        assert!(zoom.contains("d=90:"));
        assert!(zoom.contains("s=1080x1920:fps=30"));
        let pan = image_filter(&config, VisualEffect::Pan, 90);
        assert!(pan.starts_with("scale=2160:1920:force_original_aspect_ratio=increase,crop=1080:1920:"));
        assert!(pan.contains("n/90"));
    }

    #[test]
    fn test_second_pass_fades() {
        let config = TimelineConfig::default();
        let filter = second_pass_filter(&config, 4.0);
        assert!(filter.contains("fade=t=in:st=0:d=0.500,fade=t=out:st=3.500:d=0.500"));

        let short = second_pass_filter(&config, 0.6);
        assert!(short.contains("fade=t=in:st=0:d=0.300,fade=t=out:st=0.300:d=0.300"));

        let no_fade = TimelineConfig {
            fade_secs: 0.0,
            ..TimelineConfig::default()
        };
        assert!(!second_pass_filter(&no_fade, 4.0).contains("fade"));
    }

    #[test]
    fn test_interruptions_are_not_asset_errors() {
        assert!(matches!(
            as_asset_error(ClipSlot::Scene(0), "raw pass", ReelError::Cancelled),
            ReelError::Cancelled
        ));
        let err = as_asset_error(ClipSlot::Scene(2), "second pass", ReelError::render("boom"));
        assert!(matches!(err, ReelError::Asset { .. }));
        assert!(err.to_string().contains("scene 2: second pass failed"));
    }

    #[test]
    fn test_slot_paths() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(root.path(), "reel-x").unwrap();
        assert!(ClipSlot::Scene(3)
            .path(&ws, "raw")
            .ends_with("reel-x_raw_003.mp4"));
        assert!(ClipSlot::Bookend(BookendKind::Outro)
            .path(&ws, "norm")
            .ends_with("reel-x_norm_outro.mp4"));
        assert!(ClipSlot::Preview
            .path(&ws, "fill")
            .ends_with("reel-x_fill_preview.mp4"));
        assert_eq!(ClipSlot::Preview.to_string(), "preview");
    }
}
