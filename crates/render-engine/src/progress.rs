//! Render progress reporting.

use std::sync::Arc;

use serde::Serialize;

/// Progress callback shared across pipeline stages.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// One progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderProgress {
    /// Fraction of the current stage [0.0, 1.0].
    pub progress: f64,

    /// Frames encoded so far (final encode only).
    pub frames_rendered: u64,

    /// Frames the final encode will produce.
    pub total_frames: u64,

    /// Estimated seconds remaining in the stage.
    pub eta_secs: f64,

    pub stage: RenderStage,
}

impl RenderProgress {
    /// Report for a stage that has no finer-grained progress.
    pub fn stage(stage: RenderStage, progress: f64) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            frames_rendered: 0,
            total_frames: 0,
            eta_secs: 0.0,
            stage,
        }
    }
}

/// Stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStage {
    Preparing,
    Mixing,
    Normalizing,
    Composing,
    Encoding,
    Finalizing,
    Complete,
}

impl RenderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Mixing => "mixing",
            Self::Normalizing => "normalizing",
            Self::Composing => "composing",
            Self::Encoding => "encoding",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
        }
    }
}

/// Accumulates ffmpeg `-progress` key/value lines.
#[derive(Debug, Default, Clone)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub frame: u64,
    pub speed: Option<f64>,
    pub complete: bool,
}

impl ProgressState {
    /// Apply one `key=value` pair. Returns true on the `progress` key,
    /// which closes a report block.
    pub fn update(&mut self, key: &str, value: &str) -> bool {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                self.speed = value
                    .trim()
                    .strip_suffix('x')
                    .and_then(|s| s.trim().parse().ok());
            }
            "progress" => {
                self.complete = value == "end";
                return true;
            }
            _ => {}
        }
        false
    }

    /// Apply one raw line. Returns true when a report block closed.
    pub fn update_line(&mut self, line: &str) -> bool {
        match line.trim().split_once('=') {
            Some((key, value)) => self.update(key.trim(), value.trim()),
            None => false,
        }
    }

    /// Report relative to the expected output length.
    pub fn report(&self, total_frames: u64, expected_secs: f64, elapsed_secs: f64) -> RenderProgress {
        let progress = if self.complete {
            1.0
        } else if expected_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_secs).clamp(0.0, 1.0)
        };

        let frames_rendered = if self.frame > 0 {
            self.frame.min(total_frames)
        } else {
            (progress * total_frames as f64).round() as u64
        };

        let eta_secs = if progress > 0.0 {
            (elapsed_secs / progress) - elapsed_secs
        } else {
            0.0
        }
        .max(0.0);

        RenderProgress {
            progress,
            frames_rendered,
            total_frames,
            eta_secs,
            stage: if self.complete {
                RenderStage::Finalizing
            } else {
                RenderStage::Encoding
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block_parsing() {
        let mut state = ProgressState::default();
        assert!(!state.update_line("frame=150"));
        assert!(!state.update_line("out_time_us=5000000"));
        assert!(!state.update_line("speed=2.5x"));
        assert!(state.update_line("progress=continue"));

        assert_eq!(state.frame, 150);
        assert_eq!(state.out_time_secs, 5.0);
        assert_eq!(state.speed, Some(2.5));
        assert!(!state.complete);

        let report = state.report(300, 10.0, 4.0);
        assert_eq!(report.progress, 0.5);
        assert_eq!(report.frames_rendered, 150);
        assert_eq!(report.eta_secs, 4.0);
        assert_eq!(report.stage, RenderStage::Encoding);
    }

    #[test]
    fn test_end_marks_complete() {
        let mut state = ProgressState::default();
        state.update_line("speed=N/A");
        assert_eq!(state.speed, None);
        assert!(state.update_line("progress=end"));
        let report = state.report(300, 10.0, 4.0);
        assert_eq!(report.progress, 1.0);
        assert_eq!(report.stage, RenderStage::Finalizing);
    }

    #[test]
    fn test_ignores_garbage() {
        let mut state = ProgressState::default();
        assert!(!state.update_line("not a pair"));
        assert!(!state.update_line("out_time_us=N/A"));
        assert_eq!(state.out_time_secs, 0.0);
    }
}
