//! Reelsmith Planning
//!
//! Turns a render job's inputs into a concrete timeline:
//! - **Timing:** sum-preserving scene durations from narration timing
//! - **Cue timeline:** ordered, offset caption cues around intro/outro
//! - **Filter graph:** concat or crossfade chain, overlays, caption burn-in
//!
//! This crate is pure computation: no I/O, no process spawning.
//! All inputs are data; all outputs are data.

pub mod cue_timeline;
pub mod filter_graph;
pub mod timing;

pub use cue_timeline::{CueTimeline, CueTimelineSettings, SubtitleTimelineBuilder};
pub use filter_graph::{
    check_crossfade, FilterGraph, FilterGraphBuilder, GraphClip, GraphDescription, GraphInput,
};
pub use timing::TimingAllocator;
