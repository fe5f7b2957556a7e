//! Reelsmith Timeline Model
//!
//! Defines the data contracts shared by every stage of a render job:
//! - **Scenes:** narration chunks paired with a visual asset and a time slot
//! - **Media:** narration audio, intro/outro bookend clips, overlay specs
//! - **Cues:** timed captions with a base style and an entrance animation
//! - **Config:** the immutable per-job canvas and encoder settings
//! - **Job:** one production run, its temp policy and its outcome
//! - **Manifest:** the JSON document a render is described by on disk
//!
//! All times are `f64` seconds on the final output timeline unless a
//! field says otherwise.

pub mod config;
pub mod cue;
pub mod job;
pub mod manifest;
pub mod media;
pub mod scene;

pub use config::*;
pub use cue::*;
pub use job::*;
pub use manifest::*;
pub use media::*;
pub use scene::*;
