//! Final encoder run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_common::timecode::{secs_to_frames, DurationDrift};
use reelsmith_planning::filter_graph::{concat_list, GraphDescription, GraphInput};
use reelsmith_timeline_model::config::{EncoderPreference, TimelineConfig};

use crate::probe::probe_media;
use crate::progress::{ProgressCallback, ProgressState, RenderProgress, RenderStage};
use crate::tool::{CancelSignal, FfmpegCommand, ToolInvocation, ToolRunner};
use crate::workspace::JobWorkspace;

/// Frames the rendered duration may deviate from the plan before warning.
pub const DURATION_TOLERANCE_FRAMES: u32 = 2;

/// Hardware encoder looked for by the probe.
pub const HARDWARE_ENCODER: &str = "h264_qsv";

/// Video encoder of the final render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEncoder {
    /// Intel Quick Sync.
    Qsv,
    /// libx264.
    X264,
}

impl VideoEncoder {
    pub fn name(self) -> &'static str {
        match self {
            Self::Qsv => HARDWARE_ENCODER,
            Self::X264 => "libx264",
        }
    }

    fn codec_args(self, config: &TimelineConfig) -> Vec<String> {
        match self {
            Self::Qsv => vec![
                "-c:v".to_string(),
                HARDWARE_ENCODER.to_string(),
                "-global_quality".to_string(),
                config.quality.to_string(),
                "-look_ahead".to_string(),
                "1".to_string(),
            ],
            Self::X264 => vec![
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                config.render_preset.clone(),
                "-crf".to_string(),
                config.quality.to_string(),
            ],
        }
    }
}

/// What a finished encode reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub output_path: PathBuf,
    pub encoder: VideoEncoder,
    pub expected_duration: f64,
    /// Probed duration of the output; `None` when the probe failed.
    pub measured_duration: Option<f64>,
}

/// Runs the final encode.
///
/// The hardware probe runs at most once per executor; share one executor
/// across the jobs of a process.
pub struct RenderExecutor {
    runner: Arc<dyn ToolRunner>,
    config: TimelineConfig,
    hardware: OnceCell<bool>,
}

impl std::fmt::Debug for RenderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExecutor")
            .field("config", &self.config)
            .field("hardware", &self.hardware.get())
            .finish_non_exhaustive()
    }
}

impl RenderExecutor {
    pub fn new(runner: Arc<dyn ToolRunner>, config: TimelineConfig) -> Self {
        Self {
            runner,
            config,
            hardware: OnceCell::new(),
        }
    }

    /// Whether ffmpeg lists the hardware encoder. A failed probe counts as
    /// unavailable and is cached like any other answer; an interrupted one
    /// is returned as an error and probed again next time.
    pub async fn hardware_available(&self, cancel: &CancelSignal) -> ReelResult<bool> {
        self.hardware
            .get_or_try_init(|| async {
                let probe = ToolInvocation::new(
                    "ffmpeg",
                    vec!["-hide_banner".to_string(), "-encoders".to_string()],
                );
                match self.runner.run(&probe, cancel).await {
                    Ok(output) => {
                        let found = output.stdout.contains(HARDWARE_ENCODER);
                        tracing::info!(encoder = HARDWARE_ENCODER, available = found, "Probed hardware encoder");
                        Ok(found)
                    }
                    Err(err) if err.is_interruption() => Err(err),
                    Err(err) => {
                        tracing::warn!(error = %err, "Hardware encoder probe failed");
                        Ok(false)
                    }
                }
            })
            .await
            .copied()
    }

    /// Resolve an encoder preference.
    pub async fn select_encoder(
        &self,
        preference: EncoderPreference,
        cancel: &CancelSignal,
    ) -> ReelResult<VideoEncoder> {
        match preference {
            EncoderPreference::Software => Ok(VideoEncoder::X264),
            EncoderPreference::Auto => Ok(if self.hardware_available(cancel).await? {
                VideoEncoder::Qsv
            } else {
                VideoEncoder::X264
            }),
            EncoderPreference::Hardware => {
                if self.hardware_available(cancel).await? {
                    Ok(VideoEncoder::Qsv)
                } else {
                    Err(ReelError::config(format!(
                        "hardware encoding requested but {HARDWARE_ENCODER} is not available"
                    )))
                }
            }
        }
    }

    /// Encode `graph` with `audio` into `output`.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        workspace: &JobWorkspace,
        graph: &GraphDescription,
        audio: &Path,
        output: &Path,
        preference: EncoderPreference,
        cancel: &CancelSignal,
        progress: Option<&ProgressCallback>,
    ) -> ReelResult<ExecutionReport> {
        cancel.check()?;
        let encoder = self.select_encoder(preference, cancel).await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let invocation = self.command(workspace, graph, audio, output, encoder)?;
        let total_frames = secs_to_frames(graph.expected_duration, self.config.fps);

        tracing::info!(
            encoder = encoder.name(),
            inputs = graph.inputs.len() + 1,
            expected_secs = graph.expected_duration,
            output = %output.display(),
            "Starting final render"
        );

        let started = Instant::now();
        let state = std::sync::Mutex::new(ProgressState::default());
        let expected = graph.expected_duration;
        let on_line = |line: &str| {
            let Ok(mut state) = state.lock() else {
                return;
            };
            if state.update_line(line) {
                if let Some(callback) = progress {
                    callback(state.report(total_frames, expected, started.elapsed().as_secs_f64()));
                }
            }
        };

        self.runner
            .run_streaming(&invocation, cancel, &on_line)
            .await
            .map_err(|err| match err {
                ReelError::Render {
                    message,
                    diagnostic,
                    exit_code,
                } => ReelError::Render {
                    message: format!("final render failed: {message}"),
                    diagnostic,
                    exit_code,
                },
                other => other,
            })?;

        if let Some(callback) = progress {
            callback(RenderProgress {
                progress: 1.0,
                frames_rendered: total_frames,
                total_frames,
                eta_secs: 0.0,
                stage: RenderStage::Finalizing,
            });
        }

        let measured_duration = self.validate_duration(output, expected, cancel).await?;
        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            measured_secs = ?measured_duration,
            "Final render complete"
        );

        Ok(ExecutionReport {
            output_path: output.to_path_buf(),
            encoder,
            expected_duration: expected,
            measured_duration,
        })
    }

    /// Build the encoder invocation, writing concat lists as needed.
    pub fn command(
        &self,
        workspace: &JobWorkspace,
        graph: &GraphDescription,
        audio: &Path,
        output: &Path,
        encoder: VideoEncoder,
    ) -> ReelResult<ToolInvocation> {
        let audio_index = graph.inputs.len();
        let command = self
            .video_inputs(workspace, graph, FfmpegCommand::new(output).with_progress())?
            .input(audio)
            .filter_complex(graph.filter_complex.clone())
            .map(format!("[{}]", graph.video_label))
            .map(format!("{audio_index}:a"))
            .output_args(encoder.codec_args(&self.config))
            .output_args(["-pix_fmt".to_string(), self.config.pixel_format.clone()])
            .output_args(["-r".to_string(), self.config.fps.to_string()])
            .audio_codec("aac")
            .output_args(["-b:a".to_string(), self.config.audio_bitrate.clone()])
            .output_args(["-movflags", "+faststart"])
            .duration(graph.expected_duration);
        Ok(command.into_invocation())
    }

    /// Silent fast encode of `graph`, for previews.
    pub fn preview_command(
        &self,
        workspace: &JobWorkspace,
        graph: &GraphDescription,
        output: &Path,
    ) -> ReelResult<ToolInvocation> {
        let command = self
            .video_inputs(workspace, graph, FfmpegCommand::new(output))?
            .filter_complex(graph.filter_complex.clone())
            .map(format!("[{}]", graph.video_label))
            .video_codec("libx264")
            .output_args(["-preset", "ultrafast"])
            .output_args(["-pix_fmt".to_string(), self.config.pixel_format.clone()])
            .no_audio()
            .duration(graph.expected_duration);
        Ok(command.into_invocation())
    }

    /// Run [`Self::preview_command`].
    pub async fn preview(
        &self,
        workspace: &JobWorkspace,
        graph: &GraphDescription,
        output: &Path,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let invocation = self.preview_command(workspace, graph, output)?;
        self.runner.run(&invocation, cancel).await?;
        Ok(())
    }

    /// Add the graph's inputs, writing concat lists as needed.
    fn video_inputs(
        &self,
        workspace: &JobWorkspace,
        graph: &GraphDescription,
        mut command: FfmpegCommand,
    ) -> ReelResult<FfmpegCommand> {
        for (index, input) in graph.inputs.iter().enumerate() {
            command = match input {
                GraphInput::File { path, options } => command.input_with(options.clone(), path),
                GraphInput::ConcatList { clips } => {
                    let list = workspace.write_text(
                        &format!("video_list_{index}"),
                        "txt",
                        &concat_list(clips),
                    )?;
                    command.input_with(["-f", "concat", "-safe", "0"], list)
                }
            };
        }
        Ok(command)
    }

    /// Probe the output and warn when it drifts from the plan by more
    /// than [`DURATION_TOLERANCE_FRAMES`].
    async fn validate_duration(
        &self,
        output: &Path,
        expected: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<Option<f64>> {
        let measured = match probe_media(self.runner.as_ref(), output, cancel).await {
            Ok(info) => info.duration(),
            Err(err) if err.is_interruption() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Could not probe rendered output");
                None
            }
        };

        if let Some(measured_secs) = measured {
            let drift = DurationDrift {
                expected_secs: expected,
                measured_secs,
            };
            if drift.exceeds_frames(DURATION_TOLERANCE_FRAMES, self.config.fps) {
                tracing::warn!(
                    expected_secs = expected,
                    measured_secs,
                    drift_ms = drift.drift_ms(),
                    "Rendered duration deviates from plan"
                );
            }
        }
        Ok(measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsmith_timeline_model::config::CompositionMode;

    #[test]
    fn test_command_maps_video_label_and_audio_input() {
        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), "reel-test").unwrap();
        let executor = RenderExecutor::new(
            Arc::new(crate::tool::SystemToolRunner::new()),
            TimelineConfig::default(),
        );
        let graph = GraphDescription {
            inputs: vec![
                GraphInput::ConcatList {
                    clips: vec![PathBuf::from("/c/a.mp4"), PathBuf::from("/c/b.mp4")],
                },
                GraphInput::File {
                    path: PathBuf::from("/s/sticker.png"),
                    options: vec!["-loop".to_string(), "1".to_string()],
                },
            ],
            filter_complex: "[0:v]null[vout]".to_string(),
            video_label: "vout".to_string(),
            expected_duration: 12.5,
            mode: CompositionMode::Sequential,
        };

        let inv = executor
            .command(
                &workspace,
                &graph,
                Path::new("/a/mixed.wav"),
                Path::new("/o/final.mp4"),
                VideoEncoder::X264,
            )
            .unwrap();

        let list = workspace.file("video_list_0", "txt");
        assert_eq!(
            std::fs::read_to_string(&list).unwrap(),
            "file '/c/a.mp4'\nfile '/c/b.mp4'\n"
        );
        assert!(inv.args.windows(2).any(|w| w[0] == "-map" && w[1] == "[vout]"));
        assert!(inv.args.windows(2).any(|w| w[0] == "-map" && w[1] == "2:a"));
        assert_eq!(inv.value_of("-c:v"), Some("libx264"));
        assert_eq!(inv.value_of("-crf"), Some("23"));
        assert_eq!(inv.value_of("-t"), Some("12.500"));
        assert_eq!(inv.value_of("-movflags"), Some("+faststart"));
        assert_eq!(inv.output, Some(PathBuf::from("/o/final.mp4")));
    }

    #[test]
    fn test_qsv_codec_args() {
        let args = VideoEncoder::Qsv.codec_args(&TimelineConfig::default());
        assert_eq!(
            args,
            ["-c:v", "h264_qsv", "-global_quality", "23", "-look_ahead", "1"]
        );
    }

    /// Answers the encoder listing, failing the first call with `first`.
    struct EncoderListing {
        calls: std::sync::atomic::AtomicUsize,
        first: fn() -> ReelError,
    }

    impl EncoderListing {
        fn new(first: fn() -> ReelError) -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
                first,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ToolRunner for EncoderListing {
        async fn run_streaming(
            &self,
            _invocation: &ToolInvocation,
            _cancel: &CancelSignal,
            _on_stdout_line: &(dyn for<'l> Fn(&'l str) + Send + Sync),
        ) -> ReelResult<crate::tool::ToolOutput> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err((self.first)());
            }
            Ok(crate::tool::ToolOutput {
                stdout: " V..... h264_qsv             H.264 (Intel Quick Sync Video)\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_interrupted_hardware_probe_is_retried() {
        let runner = Arc::new(EncoderListing::new(|| ReelError::Timeout(5)));
        let executor = RenderExecutor::new(runner.clone(), TimelineConfig::default());
        let never = CancelSignal::never();

        assert!(matches!(
            executor.hardware_available(&never).await,
            Err(ReelError::Timeout(5))
        ));
        assert!(executor.hardware_available(&never).await.unwrap());
        assert_eq!(
            executor
                .select_encoder(EncoderPreference::Hardware, &never)
                .await
                .unwrap(),
            VideoEncoder::Qsv
        );
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_hardware_probe_is_cached_as_unavailable() {
        let runner = Arc::new(EncoderListing::new(|| ReelError::render("ffmpeg exited 1")));
        let executor = RenderExecutor::new(runner.clone(), TimelineConfig::default());
        let never = CancelSignal::never();

        assert!(!executor.hardware_available(&never).await.unwrap());
        assert!(!executor.hardware_available(&never).await.unwrap());
        assert_eq!(
            executor
                .select_encoder(EncoderPreference::Auto, &never)
                .await
                .unwrap(),
            VideoEncoder::X264
        );
        assert!(matches!(
            executor
                .select_encoder(EncoderPreference::Hardware, &never)
                .await,
            Err(ReelError::Config { .. })
        ));
        assert_eq!(runner.calls(), 1);
    }
}
