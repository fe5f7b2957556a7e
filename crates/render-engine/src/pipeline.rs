//! End-to-end render job orchestration.
//!
//! ```text
//! timing ─► crossfade preflight ─► audio mix ─► scene normalization (parallel)
//!        ─► fallbacks ─► bookend video ─► cue timeline ─► filter graph ─► encode
//! ```
//!
//! Planning failures (timing, crossfade, graph) abort before the encoder
//! runs. Scene and bookend failures are recovered and recorded in the
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use reelsmith_captions::{load_cue_file, save_cue_file, write_ass, CaptionError, StyleSheet};
use reelsmith_common::config::AppConfig;
use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_common::timecode::{DurationDrift, JobClock};
use reelsmith_planning::cue_timeline::cues_from_scenes;
use reelsmith_planning::{
    check_crossfade, CueTimeline, CueTimelineSettings, FilterGraphBuilder, GraphClip,
    GraphDescription, SubtitleTimelineBuilder, TimingAllocator,
};
use reelsmith_timeline_model::config::{CompositionMode, TimelineConfig};
use reelsmith_timeline_model::cue::{CueAnimation, SubtitleCue};
use reelsmith_timeline_model::job::{
    CueInput, MixFallback, MixFallbackAction, NarrationTiming, RenderJob, RenderOutcome,
    SubstituteSource, Substitution,
};
use reelsmith_timeline_model::media::{BookendClip, BookendKind};
use reelsmith_timeline_model::scene::{Scene, VisualEffect};

use crate::executor::{RenderExecutor, DURATION_TOLERANCE_FRAMES};
use crate::mix::{is_fatal, AudioTimelineMixer, MixedAudio};
use crate::normalize::{AssetNormalizer, ClipSlot};
use crate::probe::{probe_duration, probe_media};
use crate::progress::{ProgressCallback, RenderProgress, RenderStage};
use crate::tool::{CancelSignal, ToolRunner};
use crate::workspace::JobWorkspace;

/// Settings shared by every job of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timeline: TimelineConfig,
    pub cues: CueTimelineSettings,
    /// Words per cue when cues are derived from narration.
    pub words_per_cue: usize,
    /// Animation of derived cues.
    pub cue_animation: Option<CueAnimation>,
    /// Parent of the per-job scratch directories.
    pub temp_root: PathBuf,
    /// Scenes normalized concurrently.
    pub max_parallel: usize,
    pub styles: StyleSheet,
    /// Write `<output>.report.json` next to the output.
    pub write_report: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            timeline: TimelineConfig::default(),
            cues: CueTimelineSettings::default(),
            words_per_cue: 3,
            cue_animation: Some(CueAnimation::Fade),
            temp_root: std::env::temp_dir().join("reelsmith"),
            max_parallel: default_parallelism(),
            styles: StyleSheet::standard(),
            write_report: true,
        }
    }
}

impl PipelineSettings {
    /// Build from the application config file.
    pub fn from_app_config(config: &AppConfig) -> ReelResult<Self> {
        let timeline = TimelineConfig::from_defaults(&config.render)?;
        let captions = &config.captions;
        let cue_animation =
            CueAnimation::parse_optional(&captions.animation).map_err(ReelError::config)?;

        Ok(Self {
            timeline,
            cues: CueTimelineSettings {
                intro_fallback: captions.intro_text.clone(),
                outro_fallback: captions.outro_text.clone(),
                outro_gap: captions.outro_gap_secs,
                ..CueTimelineSettings::default()
            },
            words_per_cue: captions.words_per_cue.max(1),
            cue_animation,
            temp_root: config.render.temp_root.clone(),
            max_parallel: config
                .render
                .max_parallel_jobs
                .unwrap_or_else(default_parallelism)
                .max(1),
            styles: StyleSheet::standard(),
            write_report: true,
        })
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Timing, cues and filter graph of a job, computed without touching
/// any media. Bookends are left out since their length needs a probe.
#[derive(Debug, Clone)]
pub struct TimelinePlan {
    pub scenes: Vec<Scene>,
    pub narration_secs: f64,
    pub mode: CompositionMode,
    /// Main cues on the narration timeline.
    pub cues: CueTimeline,
    /// Graph over the clip paths the render would produce.
    pub graph: GraphDescription,
}

/// Runs render jobs from inputs to a finished video.
pub struct RenderPipeline {
    runner: Arc<dyn ToolRunner>,
    settings: PipelineSettings,
    normalizer: AssetNormalizer,
    mixer: AudioTimelineMixer,
    executor: Arc<RenderExecutor>,
    timing: TimingAllocator,
    cue_builder: SubtitleTimelineBuilder,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("settings", &self.settings)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(runner: Arc<dyn ToolRunner>, settings: PipelineSettings) -> Self {
        let executor = Arc::new(RenderExecutor::new(
            Arc::clone(&runner),
            settings.timeline.clone(),
        ));
        Self {
            normalizer: AssetNormalizer::new(Arc::clone(&runner), settings.timeline.clone()),
            mixer: AudioTimelineMixer::new(Arc::clone(&runner), &settings.timeline),
            executor,
            timing: TimingAllocator,
            cue_builder: SubtitleTimelineBuilder::new(settings.cues.clone()),
            progress: None,
            runner,
            settings,
        }
    }

    /// Share an executor (and its cached hardware probe) between pipelines.
    pub fn with_executor(mut self, executor: Arc<RenderExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn executor(&self) -> &Arc<RenderExecutor> {
        &self.executor
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Render `job` into `job.output_path`.
    ///
    /// The job's scratch directory is removed or kept per `job.temp` on
    /// both success and failure.
    pub async fn run(&self, job: &RenderJob, cancel: &CancelSignal) -> ReelResult<RenderOutcome> {
        if job.scenes.is_empty() {
            return Err(ReelError::timing("no scenes"));
        }
        self.settings.timeline.validate()?;
        cancel.check()?;

        let clock = JobClock::start();
        let workspace = JobWorkspace::create(&self.settings.temp_root, &job.job_id)?;
        tracing::info!(
            job_id = %job.job_id,
            scenes = job.scenes.len(),
            output = %job.output_path.display(),
            "Starting render job"
        );

        let span = tracing::info_span!("render_job", job_id = %job.job_id);
        let result = self
            .run_in(&workspace, job, &clock, cancel)
            .instrument(span)
            .await;

        let retained = workspace.finish(result.is_ok(), job.temp);
        match result {
            Ok(mut outcome) => {
                outcome.retained_temp_dir = retained;
                if self.settings.write_report {
                    let report = RenderOutcome::default_report_path(&outcome.output_path);
                    if let Err(err) = outcome.write_report(&report) {
                        tracing::warn!(path = %report.display(), error = %err, "Failed to write job report");
                    }
                }
                self.emit(RenderStage::Complete, 1.0);
                tracing::info!(
                    job_id = %outcome.job_id,
                    status = ?outcome.status,
                    substitutions = outcome.substitutions.len(),
                    elapsed_secs = outcome.elapsed_secs,
                    "Render job finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.job_id,
                    error = %err,
                    retained = ?retained,
                    "Render job failed"
                );
                Err(err)
            }
        }
    }

    async fn run_in(
        &self,
        workspace: &JobWorkspace,
        job: &RenderJob,
        clock: &JobClock,
        cancel: &CancelSignal,
    ) -> ReelResult<RenderOutcome> {
        let config = &self.settings.timeline;
        let mode = config.composition_mode();
        self.emit(RenderStage::Preparing, 0.0);

        let mut scenes = job.scenes.clone();
        let planned_total = match &job.narration_timing {
            NarrationTiming::Measured => None,
            timing => {
                let total = self.timing.allocate(&mut scenes, timing, None)?;
                self.preflight(&scenes, job, mode)?;
                Some(total)
            }
        };
        self.crossfade_preflight(job, &scenes, planned_total.is_none(), mode, cancel)
            .await?;

        self.emit(RenderStage::Mixing, 0.0);
        let mixed = self
            .mixer
            .mix(
                workspace,
                &job.narration,
                job.intro.as_ref(),
                job.outro.as_ref(),
                cancel,
            )
            .await?;

        match planned_total {
            None => {
                self.timing.allocate(
                    &mut scenes,
                    &NarrationTiming::Measured,
                    Some(mixed.narration_duration),
                )?;
            }
            Some(planned) => {
                let drift = DurationDrift {
                    expected_secs: planned,
                    measured_secs: mixed.narration_duration,
                };
                if drift.exceeds_frames(DURATION_TOLERANCE_FRAMES, config.fps) {
                    tracing::warn!(
                        planned_secs = planned,
                        measured_secs = mixed.narration_duration,
                        drift_ms = drift.drift_ms(),
                        "Scene timing does not match measured narration"
                    );
                }
            }
        }

        check_chain(mode, mixed.intro_duration, &scenes, mixed.outro_duration)?;

        self.emit(RenderStage::Normalizing, 0.0);
        let results = self.normalize_scenes(workspace, job, &scenes, cancel).await?;
        let (scene_clips, substitutions) =
            self.apply_fallbacks(workspace, &scenes, results, cancel).await?;

        let mut mix_fallbacks = mixed.fallbacks.clone();
        let intro = self
            .bookend_video(workspace, BookendKind::Intro, job, &mixed, &mut mix_fallbacks, cancel)
            .await?;
        let outro = self
            .bookend_video(workspace, BookendKind::Outro, job, &mixed, &mut mix_fallbacks, cancel)
            .await?;

        self.emit(RenderStage::Composing, 0.0);
        let main_cues = self.main_cues(job, &scenes)?;
        let cue_timeline = self.cue_builder.build(
            &main_cues,
            caption_of(job.intro.as_ref()),
            caption_of(job.outro.as_ref()),
            mixed.intro_duration,
            mixed.outro_duration,
        );
        let subtitles = workspace.write_text(
            "captions",
            "ass",
            &write_ass(
                &cue_timeline.cues,
                config.width,
                config.height,
                &self.settings.styles,
            ),
        )?;

        let clips: Vec<GraphClip> = intro
            .into_iter()
            .chain(
                scene_clips
                    .into_iter()
                    .zip(&scenes)
                    .map(|(path, scene)| GraphClip::new(path, scene.duration)),
            )
            .chain(outro)
            .collect();
        let graph =
            FilterGraphBuilder::new(config).build(&clips, &job.overlays, &subtitles, mode)?;
        tracing::debug!(
            clips = clips.len(),
            cues = cue_timeline.cues.len(),
            expected_secs = graph.expected_duration,
            audio_secs = mixed.total_duration(),
            "Composed filter graph"
        );

        self.emit(RenderStage::Encoding, 0.0);
        let report = self
            .executor
            .execute(
                workspace,
                &graph,
                &mixed.path,
                &job.output_path,
                config.encoder,
                cancel,
                self.progress.as_ref(),
            )
            .await?;

        Ok(RenderOutcome {
            job_id: job.job_id.clone(),
            output_path: report.output_path,
            status: RenderOutcome::classify(&substitutions, &mix_fallbacks),
            substitutions,
            mix_fallbacks,
            expected_duration: report.expected_duration,
            measured_duration: report.measured_duration,
            encoder: report.encoder.name().to_string(),
            started_at: clock.started_wall().to_string(),
            elapsed_secs: clock.elapsed_secs(),
            retained_temp_dir: None,
        })
    }

    /// Reject a crossfade longer than any scene slot before a tool runs.
    fn preflight(&self, scenes: &[Scene], job: &RenderJob, mode: CompositionMode) -> ReelResult<()> {
        let CompositionMode::Crossfade { duration } = mode else {
            return Ok(());
        };
        let clip_count =
            scenes.len() + usize::from(job.intro.is_some()) + usize::from(job.outro.is_some());
        if clip_count < 2 {
            return Ok(());
        }
        let durations: Vec<f64> = scenes.iter().map(|s| s.duration).collect();
        check_crossfade(&durations, duration)
    }

    /// Crossfade check over the whole chain, bookends included, before any
    /// ffmpeg run. Bookend and measured narration lengths come from ffprobe.
    async fn crossfade_preflight(
        &self,
        job: &RenderJob,
        scenes: &[Scene],
        measured: bool,
        mode: CompositionMode,
        cancel: &CancelSignal,
    ) -> ReelResult<()> {
        if !matches!(mode, CompositionMode::Crossfade { .. }) {
            return Ok(());
        }
        let mut scenes = scenes.to_vec();
        if measured {
            let narration = match job.narration.measured_duration {
                Some(d) if d > 0.0 => d,
                _ => probe_duration(self.runner.as_ref(), &job.narration.path, cancel).await?,
            };
            self.timing
                .allocate(&mut scenes, &NarrationTiming::Measured, Some(narration))?;
        }
        let intro = self.bookend_duration(job.intro.as_ref(), cancel).await?;
        let outro = self.bookend_duration(job.outro.as_ref(), cancel).await?;
        check_chain(mode, intro, &scenes, outro)
    }

    /// Normalize every scene, at most `max_parallel` at a time. The result
    /// holds one entry per scene; only fatal errors fail the whole call.
    async fn normalize_scenes(
        &self,
        workspace: &JobWorkspace,
        job: &RenderJob,
        scenes: &[Scene],
        cancel: &CancelSignal,
    ) -> ReelResult<Vec<ReelResult<PathBuf>>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel.max(1)));
        // Stops the siblings of a fatal failure through their runners, so
        // each one removes its partial output.
        let (scope, scoped) = cancel.child();
        let mut results: Vec<Option<ReelResult<PathBuf>>> = scenes.iter().map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, scene) in scenes.iter().enumerate() {
            let Some(asset) = scene.asset.clone() else {
                results[index] = Some(Err(ReelError::asset(format!(
                    "scene {index}: asset unavailable"
                ))));
                continue;
            };
            let normalizer = self.normalizer.clone();
            let workspace = workspace.clone();
            let cancel = scoped.clone();
            let semaphore = Arc::clone(&semaphore);
            let effect = scene.effect.unwrap_or(job.default_effect);
            let (duration, is_image) = (scene.duration, scene.is_image);

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        normalizer
                            .normalize(
                                &workspace,
                                ClipSlot::Scene(index),
                                &asset,
                                duration,
                                is_image,
                                effect,
                                &cancel,
                            )
                            .await
                    }
                    Err(_) => Err(ReelError::Cancelled),
                };
                (index, result)
            });
        }

        let total = scenes.len();
        let mut finished = total - tasks.len();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                ReelError::Other(anyhow::anyhow!("normalization task failed: {e}"))
            })?;
            let result = match result {
                Err(err) if is_fatal(&err) => {
                    tracing::warn!(slot = index, error = %err, "Stopping remaining normalizations");
                    scope.cancel();
                    while tasks.join_next().await.is_some() {}
                    return Err(err);
                }
                other => other,
            };
            results[index] = Some(result);
            finished += 1;
            self.emit(RenderStage::Normalizing, finished as f64 / total as f64);
        }

        Ok(results
            .into_iter()
            .enumerate()
            .map(|(index, r)| {
                r.unwrap_or_else(|| Err(ReelError::asset(format!("scene {index}: not normalized"))))
            })
            .collect())
    }

    /// Fill every failed slot from a neighbour or a placeholder.
    async fn apply_fallbacks(
        &self,
        workspace: &JobWorkspace,
        scenes: &[Scene],
        results: Vec<ReelResult<PathBuf>>,
        cancel: &CancelSignal,
    ) -> ReelResult<(Vec<PathBuf>, Vec<Substitution>)> {
        let succeeded: Vec<bool> = results.iter().map(Result::is_ok).collect();
        if !succeeded.contains(&true) {
            return Err(ReelError::asset("no scene assets could be normalized"));
        }
        let originals: Vec<Option<PathBuf>> =
            results.iter().map(|r| r.as_ref().ok().cloned()).collect();

        let mut clips = Vec::with_capacity(results.len());
        let mut substitutions = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            let err = match result {
                Ok(path) => {
                    clips.push(path);
                    continue;
                }
                Err(err) => err,
            };

            let scene = &scenes[index];
            let slot = ClipSlot::Scene(index);
            let mut source = substitute_for(index, &succeeded);
            let donor = match source {
                SubstituteSource::PreviousClip { scene_index }
                | SubstituteSource::NextClip { scene_index } => originals[scene_index].as_deref(),
                SubstituteSource::Placeholder => None,
            };

            let retimed = match donor {
                Some(donor) => {
                    match self
                        .normalizer
                        .retime(workspace, slot, donor, scene.duration, cancel)
                        .await
                    {
                        Ok(path) => Some(path),
                        Err(retime_err) if is_fatal(&retime_err) => return Err(retime_err),
                        Err(retime_err) => {
                            tracing::warn!(scene = index, error = %retime_err, "Re-timing neighbour clip failed");
                            None
                        }
                    }
                }
                None => None,
            };
            let path = match retimed {
                Some(path) => path,
                None => {
                    source = SubstituteSource::Placeholder;
                    self.normalizer
                        .placeholder(workspace, slot, scene.duration, cancel)
                        .await?
                }
            };

            tracing::warn!(scene = index, source = ?source, reason = %err, "Substituted scene clip");
            substitutions.push(Substitution {
                scene_index: index,
                scene_id: scene.id,
                source,
                reason: err.to_string(),
            });
            clips.push(path);
        }
        Ok((clips, substitutions))
    }

    /// Normalized bookend video sized to its audio slot. A bookend whose
    /// video cannot be normalized is replaced by a placeholder of the same
    /// length so audio and picture stay aligned.
    async fn bookend_video(
        &self,
        workspace: &JobWorkspace,
        kind: BookendKind,
        job: &RenderJob,
        mixed: &MixedAudio,
        fallbacks: &mut Vec<MixFallback>,
        cancel: &CancelSignal,
    ) -> ReelResult<Option<GraphClip>> {
        let Some(clip) = job.bookend(kind).filter(|_| mixed.has_bookend(kind)) else {
            return Ok(None);
        };
        let duration = match kind {
            BookendKind::Intro => mixed.intro_duration,
            BookendKind::Outro => mixed.outro_duration,
        };
        let slot = ClipSlot::Bookend(kind);

        let path = match self
            .normalizer
            .normalize(workspace, slot, &clip.path, duration, false, VisualEffect::Static, cancel)
            .await
        {
            Ok(path) => path,
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(segment = %kind, error = %err, "Bookend video replaced by placeholder");
                fallbacks.push(MixFallback {
                    segment: kind,
                    action: MixFallbackAction::PlaceholderVideo,
                    reason: err.to_string(),
                });
                self.normalizer
                    .placeholder(workspace, slot, duration, cancel)
                    .await?
            }
        };
        Ok(Some(GraphClip::new(path, duration)))
    }

    /// Main cues on the narration timeline.
    fn main_cues(&self, job: &RenderJob, scenes: &[Scene]) -> ReelResult<Vec<SubtitleCue>> {
        match &job.cues {
            CueInput::FromNarration => Ok(cues_from_scenes(
                scenes,
                self.settings.words_per_cue,
                self.settings.cue_animation,
            )),
            CueInput::Inline(cues) => Ok(cues.clone()),
            CueInput::File(path) => load_cue_file(path).map_err(caption_error),
        }
    }

    /// Plan `job` without running any tool.
    ///
    /// `narration_secs` stands in for the measured narration length and is
    /// required when the job's timing is [`NarrationTiming::Measured`].
    pub fn plan(&self, job: &RenderJob, narration_secs: Option<f64>) -> ReelResult<TimelinePlan> {
        let mode = self.settings.timeline.composition_mode();
        let mut scenes = job.scenes.clone();
        let narration_secs = self
            .timing
            .allocate(&mut scenes, &job.narration_timing, narration_secs)?;
        self.preflight(&scenes, job, mode)?;
        let main = self.main_cues(job, &scenes)?;
        let cues = self.cue_builder.build(&main, None, None, 0.0, 0.0);

        let workspace = JobWorkspace::planned(&self.settings.temp_root, &job.job_id);
        let clips: Vec<GraphClip> = scenes
            .iter()
            .enumerate()
            .map(|(i, s)| GraphClip::new(ClipSlot::Scene(i).path(&workspace, "norm"), s.duration))
            .collect();
        let graph = FilterGraphBuilder::new(&self.settings.timeline).build(
            &clips,
            &job.overlays,
            &workspace.file("captions", "ass"),
            mode,
        )?;

        Ok(TimelinePlan {
            scenes,
            narration_secs,
            mode,
            cues,
            graph,
        })
    }

    /// Build the full cue timeline of `job` and save it to `output`
    /// (`.ass` or `.srt`). Bookend lengths are probed; an unreadable
    /// bookend gets no caption.
    pub async fn build_captions(
        &self,
        job: &RenderJob,
        output: &Path,
        cancel: &CancelSignal,
    ) -> ReelResult<CueTimeline> {
        if job.scenes.is_empty() {
            return Err(ReelError::timing("no scenes"));
        }
        let measured = match job.narration_timing {
            NarrationTiming::Measured => Some(match job.narration.measured_duration {
                Some(d) if d > 0.0 => d,
                _ => probe_duration(self.runner.as_ref(), &job.narration.path, cancel).await?,
            }),
            _ => None,
        };

        let mut scenes = job.scenes.clone();
        self.timing
            .allocate(&mut scenes, &job.narration_timing, measured)?;

        let intro_duration = self.bookend_duration(job.intro.as_ref(), cancel).await?;
        let outro_duration = self.bookend_duration(job.outro.as_ref(), cancel).await?;

        let main = self.main_cues(job, &scenes)?;
        let timeline = self.cue_builder.build(
            &main,
            caption_of(job.intro.as_ref()),
            caption_of(job.outro.as_ref()),
            intro_duration,
            outro_duration,
        );

        let config = &self.settings.timeline;
        save_cue_file(
            output,
            &timeline.cues,
            config.width,
            config.height,
            &self.settings.styles,
        )
        .map_err(caption_error)?;
        tracing::info!(
            path = %output.display(),
            cues = timeline.cues.len(),
            repairs = timeline.repairs.len(),
            "Wrote captions"
        );
        Ok(timeline)
    }

    /// Caption check without the media: the job's captions burned over a
    /// solid background for the first `duration` seconds, no audio.
    pub async fn preview(
        &self,
        job: &RenderJob,
        output: &Path,
        duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<CueTimeline> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ReelError::config(format!(
                "preview duration must be positive, got {duration}"
            )));
        }
        cancel.check()?;

        let workspace = JobWorkspace::create(&self.settings.temp_root, &job.job_id)?;
        let result = self.preview_in(&workspace, job, output, duration, cancel).await;
        let retained = workspace.finish(result.is_ok(), job.temp);
        match &result {
            Ok(timeline) => tracing::info!(
                output = %output.display(),
                duration,
                cues = timeline.cues.len(),
                "Preview written"
            ),
            Err(err) => tracing::error!(error = %err, retained = ?retained, "Preview failed"),
        }
        result
    }

    async fn preview_in(
        &self,
        workspace: &JobWorkspace,
        job: &RenderJob,
        output: &Path,
        duration: f64,
        cancel: &CancelSignal,
    ) -> ReelResult<CueTimeline> {
        let captions = workspace.file("captions", "ass");
        let timeline = self.build_captions(job, &captions, cancel).await?;
        let background = self
            .normalizer
            .placeholder(workspace, ClipSlot::Preview, duration, cancel)
            .await?;
        let graph = FilterGraphBuilder::new(&self.settings.timeline).build(
            &[GraphClip::new(background, duration)],
            &[],
            &captions,
            CompositionMode::Sequential,
        )?;
        self.executor.preview(workspace, &graph, output, cancel).await?;
        Ok(timeline)
    }

    async fn bookend_duration(
        &self,
        clip: Option<&BookendClip>,
        cancel: &CancelSignal,
    ) -> ReelResult<f64> {
        let Some(clip) = clip else {
            return Ok(0.0);
        };
        match probe_media(self.runner.as_ref(), &clip.path, cancel).await {
            Ok(info) => Ok(info.picture_duration().unwrap_or(0.0)),
            Err(err) if is_fatal(&err) => Err(err),
            Err(err) => {
                tracing::warn!(path = %clip.path.display(), error = %err, "Bookend length unknown, no caption");
                Ok(0.0)
            }
        }
    }

    fn emit(&self, stage: RenderStage, progress: f64) {
        if let Some(callback) = &self.progress {
            callback(RenderProgress::stage(stage, progress));
        }
    }
}

/// Crossfade precondition over `[intro] + scenes + [outro]`; a zero
/// length bookend is not part of the chain.
fn check_chain(mode: CompositionMode, intro: f64, scenes: &[Scene], outro: f64) -> ReelResult<()> {
    let CompositionMode::Crossfade { duration } = mode else {
        return Ok(());
    };
    let lengths: Vec<f64> = (intro > 0.0)
        .then_some(intro)
        .into_iter()
        .chain(scenes.iter().map(|s| s.duration))
        .chain((outro > 0.0).then_some(outro))
        .collect();
    if lengths.len() < 2 {
        return Ok(());
    }
    check_crossfade(&lengths, duration)
}

fn caption_of(clip: Option<&BookendClip>) -> Option<&str> {
    clip.and_then(|c| c.caption.as_deref())
}

fn caption_error(err: CaptionError) -> ReelError {
    match err {
        CaptionError::IoError { source, .. } => ReelError::Io(source),
        other => ReelError::config(format!("cue file: {other}")),
    }
}

/// Which clip stands in for failed slot `slot`: the nearest earlier
/// success, else the nearest later one.
pub fn substitute_for(slot: usize, succeeded: &[bool]) -> SubstituteSource {
    if let Some(scene_index) = (0..slot).rev().find(|&i| succeeded[i]) {
        return SubstituteSource::PreviousClip { scene_index };
    }
    match (slot + 1..succeeded.len()).find(|&i| succeeded[i]) {
        Some(scene_index) => SubstituteSource::NextClip { scene_index },
        None => SubstituteSource::Placeholder,
    }
}
