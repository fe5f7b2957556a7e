//! Reelsmith Render Engine
//!
//! Turns a planned render job into a finished vertical video by driving
//! ffmpeg and ffprobe.
//!
//! # Pipeline Architecture
//!
//! ```text
//! narration.mp3 ─┐
//! intro.mp4 ─────┼── Audio mix (level, silence, concat) ──────────────┐
//! outro.mp4 ─────┘                                                    │
//!                                                                     │
//! scene assets ──── Normalize (parallel, 2 passes) ── Fallbacks ──┐   │
//!                                                                 │   │
//! cues ──────────── Cue timeline ── captions.ass ─────────────────┤   │
//!                                                                 ▼   ▼
//! overlays ──────────────────────────────────────────── Filter graph + Encode
//!                                                                     │
//!                                                                     ▼
//!                                                                 final.mp4
//! ```
//!
//! Every external process goes through a [`ToolRunner`], so the whole
//! pipeline can be driven by a scripted runner in tests.

pub mod executor;
pub mod mix;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod tool;
pub mod workspace;

pub use executor::{ExecutionReport, RenderExecutor, VideoEncoder};
pub use mix::{AudioTimelineMixer, MixedAudio};
pub use normalize::{AssetNormalizer, ClipSlot};
pub use pipeline::{PipelineSettings, RenderPipeline, TimelinePlan};
pub use probe::MediaInfo;
pub use progress::{ProgressCallback, RenderProgress, RenderStage};
pub use tool::{
    check_tools, require_tools, CancelHandle, CancelSignal, SystemToolRunner, ToolInvocation,
    ToolOutput, ToolRunner,
};
pub use workspace::JobWorkspace;
