//! Filter graph construction for the final render.
//!
//! The graph is an append-only list of named stages. The builder keeps
//! track of the current terminal stream, so transitions, overlays and the
//! caption burn-in each attach to whatever stream came last without any
//! positional labels.
//!
//! ```text
//! clips ──► concat list ─────────────┐
//!   or                               ├──► overlay 0 ─► … ─► overlay n ─► ass ─► [vout]
//! clips ──► xfade chain ─► tpad ─────┘
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_timeline_model::config::{CompositionMode, TimelineConfig};
use reelsmith_timeline_model::media::{OverlayMotion, OverlaySpec};

/// Most overlays a single render may carry.
pub const MAX_OVERLAYS: usize = 8;

/// Label of the finished video stream.
pub const VIDEO_OUTPUT_LABEL: &str = "vout";

/// A normalized clip and its planned duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphClip {
    pub path: PathBuf,
    pub duration: f64,
}

impl GraphClip {
    pub fn new(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }
}

/// One input of the final encoder run, in input-index order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphInput {
    /// A media file with options placed before its `-i`.
    File { path: PathBuf, options: Vec<String> },
    /// Clips joined by the concat demuxer. The executor writes the list.
    ConcatList { clips: Vec<PathBuf> },
}

/// One `[in]...filter[out]` stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStage {
    pub inputs: Vec<String>,
    pub filter: String,
    pub output: String,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        write!(f, "{}[{}]", self.filter, self.output)
    }
}

/// Append-only filter graph with a threaded terminal stream.
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    stages: Vec<FilterStage>,
    labels: HashSet<String>,
    terminal: Option<String>,
}

impl FilterGraph {
    /// Graph whose terminal starts at an input stream such as `0:v`.
    pub fn from_source(stream: impl Into<String>) -> Self {
        Self {
            terminal: Some(stream.into()),
            ..Self::default()
        }
    }

    /// Current terminal stream.
    pub fn terminal(&self) -> Option<&str> {
        self.terminal.as_deref()
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Add a stage on the side without moving the terminal (e.g. preparing
    /// an overlay sprite).
    pub fn branch(
        &mut self,
        inputs: Vec<String>,
        filter: impl Into<String>,
        output: impl Into<String>,
    ) -> ReelResult<String> {
        let output = output.into();
        self.push(inputs, filter.into(), output.clone())?;
        Ok(output)
    }

    /// Set the terminal to an existing stream label.
    pub fn set_terminal(&mut self, stream: impl Into<String>) {
        self.terminal = Some(stream.into());
    }

    /// Apply `filter` to the terminal stream plus `extra` inputs; the
    /// output becomes the new terminal.
    pub fn append(
        &mut self,
        extra: &[String],
        filter: impl Into<String>,
        output: impl Into<String>,
    ) -> ReelResult<()> {
        let terminal = self
            .terminal
            .clone()
            .ok_or_else(|| ReelError::graph("filter graph has no terminal stream"))?;
        let output = output.into();
        let mut inputs = Vec::with_capacity(extra.len() + 1);
        inputs.push(terminal);
        inputs.extend(extra.iter().cloned());
        self.push(inputs, filter.into(), output.clone())?;
        self.terminal = Some(output);
        Ok(())
    }

    fn push(&mut self, inputs: Vec<String>, filter: String, output: String) -> ReelResult<()> {
        if !self.labels.insert(output.clone()) {
            return Err(ReelError::graph(format!(
                "stream label [{output}] defined twice"
            )));
        }
        self.stages.push(FilterStage {
            inputs,
            filter,
            output,
        });
        Ok(())
    }

    /// `-filter_complex` text.
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Everything the executor needs to run the final encode.
#[derive(Debug, Clone, Serialize)]
pub struct GraphDescription {
    /// Video and overlay inputs. Audio is appended by the executor.
    pub inputs: Vec<GraphInput>,
    pub filter_complex: String,
    /// Label of the finished video stream.
    pub video_label: String,
    /// Planned output duration (seconds).
    pub expected_duration: f64,
    pub mode: CompositionMode,
}

/// Builds the final render graph.
#[derive(Debug, Clone)]
pub struct FilterGraphBuilder<'a> {
    config: &'a TimelineConfig,
}

impl<'a> FilterGraphBuilder<'a> {
    pub fn new(config: &'a TimelineConfig) -> Self {
        Self { config }
    }

    /// Compose clips, overlays and the caption burn-in.
    ///
    /// Every precondition is checked here so that a bad plan fails with a
    /// `Graph` error before any encoder runs.
    pub fn build(
        &self,
        clips: &[GraphClip],
        overlays: &[OverlaySpec],
        subtitle_path: &Path,
        mode: CompositionMode,
    ) -> ReelResult<GraphDescription> {
        validate_clips(clips)?;
        validate_overlays(overlays)?;

        let total: f64 = clips.iter().map(|c| c.duration).sum();
        let mut inputs = Vec::new();

        let mut graph = match mode {
            CompositionMode::Crossfade { duration } if clips.len() > 1 => {
                self.crossfade_chain(clips, duration, &mut inputs)?
            }
            CompositionMode::Crossfade { .. } | CompositionMode::Sequential => {
                inputs.push(GraphInput::ConcatList {
                    clips: clips.iter().map(|c| c.path.clone()).collect(),
                });
                FilterGraph::from_source("0:v")
            }
        };

        for (i, overlay) in overlays.iter().enumerate() {
            let index = inputs.len();
            inputs.push(GraphInput::File {
                path: overlay.path.clone(),
                options: vec![
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    self.config.fps.to_string(),
                    "-t".to_string(),
                    format!("{:.3}", overlay.end),
                ],
            });
            let sprite = graph.branch(
                vec![format!("{index}:v")],
                format!("scale={}:-1,format=rgba", overlay.width.max(2)),
                format!("ovl{i}"),
            )?;
            graph.append(
                &[sprite],
                format!(
                    "overlay=x=(W-w)/2:y='{}':enable='between(t,{:.3},{:.3})'",
                    overlay_y_expr(overlay),
                    overlay.start,
                    overlay.end
                ),
                format!("v_ovl{i}"),
            )?;
        }

        graph.append(
            &[],
            format!("ass='{}'", escape_filter_path(subtitle_path)),
            VIDEO_OUTPUT_LABEL,
        )?;

        let filter_complex = graph.render();
        tracing::debug!(
            clips = clips.len(),
            overlays = overlays.len(),
            stages = graph.stages().len(),
            expected_secs = total,
            "Built filter graph"
        );

        Ok(GraphDescription {
            inputs,
            filter_complex,
            video_label: VIDEO_OUTPUT_LABEL.to_string(),
            expected_duration: total,
            mode,
        })
    }

    /// Chain `xfade` transitions. Transition `i` starts at the cumulative
    /// duration of clips `0..i` minus `i` crossfades. The overlap is paid
    /// back with a cloned tail so video length matches the narration.
    fn crossfade_chain(
        &self,
        clips: &[GraphClip],
        crossfade: f64,
        inputs: &mut Vec<GraphInput>,
    ) -> ReelResult<FilterGraph> {
        let durations: Vec<f64> = clips.iter().map(|c| c.duration).collect();
        check_crossfade(&durations, crossfade)?;

        let mut graph = FilterGraph::default();
        for (i, clip) in clips.iter().enumerate() {
            inputs.push(GraphInput::File {
                path: clip.path.clone(),
                options: Vec::new(),
            });
            graph.branch(
                vec![format!("{i}:v")],
                format!(
                    "fps={},settb=AVTB,setsar=1,setpts=PTS-STARTPTS",
                    self.config.fps
                ),
                format!("c{i}"),
            )?;
        }

        graph.set_terminal("c0");
        let mut cumulative = clips[0].duration;
        for (i, clip) in clips.iter().enumerate().skip(1) {
            let offset = cumulative - i as f64 * crossfade;
            graph.append(
                &[format!("c{i}")],
                format!("xfade=transition=fade:duration={crossfade:.3}:offset={offset:.3}"),
                format!("x{i}"),
            )?;
            cumulative += clip.duration;
        }

        let lost = (clips.len() - 1) as f64 * crossfade;
        graph.append(
            &[],
            format!("tpad=stop_mode=clone:stop_duration={lost:.3}"),
            "xpad",
        )?;
        Ok(graph)
    }
}

/// Crossfade precondition: positive and shorter than every clip.
///
/// Callers may run this on planned durations before any clip exists, so
/// a bad transition length fails before the first encoder run.
pub fn check_crossfade(durations: &[f64], crossfade: f64) -> ReelResult<()> {
    if !crossfade.is_finite() || crossfade <= 0.0 {
        return Err(ReelError::graph(format!(
            "crossfade duration must be positive, got {crossfade}"
        )));
    }
    let (shortest_index, shortest) = durations
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| ReelError::graph("no clips to compose"))?;
    if crossfade >= shortest {
        return Err(ReelError::graph(format!(
            "crossfade {crossfade:.3}s must be shorter than the shortest clip \
             (clip {shortest_index}: {shortest:.3}s)"
        )));
    }
    Ok(())
}

fn validate_clips(clips: &[GraphClip]) -> ReelResult<()> {
    if clips.is_empty() {
        return Err(ReelError::graph("no clips to compose"));
    }
    for (i, clip) in clips.iter().enumerate() {
        if !clip.duration.is_finite() || clip.duration <= 0.0 {
            return Err(ReelError::graph(format!(
                "clip {i} has invalid duration {}",
                clip.duration
            )));
        }
    }
    Ok(())
}

fn validate_overlays(overlays: &[OverlaySpec]) -> ReelResult<()> {
    if overlays.len() > MAX_OVERLAYS {
        return Err(ReelError::graph(format!(
            "{} overlays requested, at most {MAX_OVERLAYS} supported",
            overlays.len()
        )));
    }
    for (i, overlay) in overlays.iter().enumerate() {
        if overlay.start < 0.0 || overlay.end <= overlay.start {
            return Err(ReelError::graph(format!(
                "overlay {i} has invalid window [{}, {}]",
                overlay.start, overlay.end
            )));
        }
    }
    Ok(())
}

/// Vertical position expression; `h` is the overlay height.
fn overlay_y_expr(overlay: &OverlaySpec) -> String {
    match overlay.motion {
        OverlayMotion::Float {
            amplitude,
            frequency,
        } => format!(
            "{}-h/2+{amplitude:.2}*sin(2*PI*{frequency:.3}*t)",
            overlay.y_center
        ),
        OverlayMotion::Static => format!("{}-h/2", overlay.y_center),
    }
}

/// Escape a path for use inside a single-quoted filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

/// Body of a concat-demuxer list file for `clips`.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clips(durations: &[f64]) -> Vec<GraphClip> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| GraphClip::new(format!("/tmp/job/norm_{i:03}.mp4"), d))
            .collect()
    }

    fn build(
        durations: &[f64],
        overlays: &[OverlaySpec],
        mode: CompositionMode,
    ) -> ReelResult<GraphDescription> {
        let config = TimelineConfig::default();
        FilterGraphBuilder::new(&config).build(
            &clips(durations),
            overlays,
            Path::new("/tmp/job/subs.ass"),
            mode,
        )
    }

    #[test]
    fn test_sequential_uses_concat_list_and_burns_subtitles() {
        let graph = build(&[3.0, 4.0, 5.0], &[], CompositionMode::Sequential).unwrap();
        assert_eq!(graph.inputs.len(), 1);
        assert!(matches!(&graph.inputs[0], GraphInput::ConcatList { clips } if clips.len() == 3));
        assert_eq!(graph.filter_complex, "[0:v]ass='/tmp/job/subs.ass'[vout]");
        assert_eq!(graph.expected_duration, 12.0);
        assert_eq!(graph.video_label, "vout");
    }

    #[test]
    fn test_crossfade_offsets_accumulate() {
        let graph = build(
            &[3.0, 4.0, 5.0],
            &[],
            CompositionMode::Crossfade { duration: 0.5 },
        )
        .unwrap();

        assert_eq!(graph.inputs.len(), 3);
        assert!(graph
            .filter_complex
            .contains("[c0][c1]xfade=transition=fade:duration=0.500:offset=2.500[x1]"));
        assert!(graph
            .filter_complex
            .contains("[x1][c2]xfade=transition=fade:duration=0.500:offset=6.000[x2]"));
        assert!(graph
            .filter_complex
            .contains("[x2]tpad=stop_mode=clone:stop_duration=1.000[xpad]"));
        assert!(graph.filter_complex.ends_with("[xpad]ass='/tmp/job/subs.ass'[vout]"));
        assert_eq!(graph.expected_duration, 12.0);
    }

    #[test]
    fn test_crossfade_not_shorter_than_clip_is_graph_error() {
        let err = build(
            &[3.0, 0.8, 2.0],
            &[],
            CompositionMode::Crossfade { duration: 1.0 },
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::Graph { .. }));
        assert!(err.to_string().contains("clip 1"));
    }

    #[test]
    fn test_crossfade_preflight_on_planned_durations() {
        assert!(check_crossfade(&[2.0, 1.5], 1.0).is_ok());
        assert!(check_crossfade(&[2.0, 0.8], 1.0).is_err());
        assert!(check_crossfade(&[2.0], 0.0).is_err());
        assert!(check_crossfade(&[], 0.5).is_err());
    }

    #[test]
    fn test_single_clip_crossfade_degenerates_to_concat() {
        let graph = build(&[2.0], &[], CompositionMode::Crossfade { duration: 5.0 }).unwrap();
        assert!(matches!(graph.inputs[0], GraphInput::ConcatList { .. }));
    }

    #[test]
    fn test_overlays_get_unique_labels_and_time_gates() {
        let overlays = vec![
            OverlaySpec::new("/s/a.png", 1.0, 3.0),
            OverlaySpec {
                motion: OverlayMotion::Static,
                ..OverlaySpec::new("/s/b.png", 2.0, 6.5)
            },
        ];
        let graph = build(&[4.0, 4.0], &overlays, CompositionMode::Sequential).unwrap();

        assert_eq!(graph.inputs.len(), 3);
        match &graph.inputs[2] {
            GraphInput::File { path, options } => {
                assert_eq!(path, &PathBuf::from("/s/b.png"));
                assert_eq!(options.last().map(String::as_str), Some("6.500"));
            }
            other => panic!("unexpected input {other:?}"),
        }

        let fc = &graph.filter_complex;
        assert!(fc.contains("[1:v]scale=700:-1,format=rgba[ovl0]"));
        assert!(fc.contains("[2:v]scale=700:-1,format=rgba[ovl1]"));
        assert!(fc.contains("[0:v][ovl0]overlay=x=(W-w)/2:y='750-h/2+20.00*sin(2*PI*0.500*t)':enable='between(t,1.000,3.000)'[v_ovl0]"));
        assert!(fc.contains("[v_ovl0][ovl1]overlay=x=(W-w)/2:y='750-h/2':enable='between(t,2.000,6.500)'[v_ovl1]"));
        assert!(fc.ends_with("[v_ovl1]ass='/tmp/job/subs.ass'[vout]"));
    }

    #[test]
    fn test_terminal_is_always_subtitle_burn() {
        for count in 0..=MAX_OVERLAYS {
            let overlays: Vec<OverlaySpec> = (0..count)
                .map(|i| OverlaySpec::new(format!("/s/{i}.png"), 0.0, 1.0))
                .collect();
            for mode in [
                CompositionMode::Sequential,
                CompositionMode::Crossfade { duration: 0.25 },
            ] {
                let graph = build(&[1.0, 2.0, 1.5], &overlays, mode).unwrap();
                let last = graph.filter_complex.rsplit(';').next().unwrap();
                assert!(last.contains("]ass='"));
                assert!(last.ends_with("[vout]"));
            }
        }
    }

    #[test]
    fn test_too_many_overlays_rejected() {
        let overlays: Vec<OverlaySpec> = (0..=MAX_OVERLAYS)
            .map(|i| OverlaySpec::new(format!("/s/{i}.png"), 0.0, 1.0))
            .collect();
        let err = build(&[2.0], &overlays, CompositionMode::Sequential).unwrap_err();
        assert!(matches!(err, ReelError::Graph { .. }));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(build(&[], &[], CompositionMode::Sequential).is_err());
        assert!(build(&[1.0, 0.0], &[], CompositionMode::Sequential).is_err());
        let backwards = vec![OverlaySpec::new("/s/a.png", 3.0, 1.0)];
        assert!(build(&[2.0], &backwards, CompositionMode::Sequential).is_err());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut graph = FilterGraph::from_source("0:v");
        graph.append(&[], "null", "a").unwrap();
        assert!(graph.append(&[], "null", "a").is_err());
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("C:\\subs\\it's.ass")),
            "C\\:/subs/it'\\''s.ass"
        );
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/a/one.mp4"), PathBuf::from("/a/it's.mp4")]);
        assert_eq!(list, "file '/a/one.mp4'\nfile '/a/it'\\''s.mp4'\n");
    }
}
