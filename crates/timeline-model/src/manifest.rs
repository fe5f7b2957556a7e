//! Render manifests.
//!
//! A manifest is the JSON description of one render: the scene list from
//! the script collaborator, resolved asset paths from the fetch
//! collaborator, the narration file with whatever timing is known, and
//! optional bookends, cues and overlays. Relative paths are resolved
//! against the directory holding the manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cue::SubtitleCue;
use crate::job::{CueInput, NarrationTiming, RenderJob};
use crate::media::{AudioSegment, BookendClip, OverlaySpec};
use crate::scene::{is_image_path, Scene, VisualEffect};

/// Top-level manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderManifest {
    /// Scenes in output order.
    pub scenes: Vec<ManifestScene>,

    /// Narration track and known timing.
    pub narration: ManifestNarration,

    #[serde(default)]
    pub intro: Option<BookendClip>,

    #[serde(default)]
    pub outro: Option<BookendClip>,

    /// Main cues. Omitted means cues are derived from narration text.
    #[serde(default)]
    pub cues: Option<CueSource>,

    #[serde(default)]
    pub overlays: Vec<OverlaySpec>,

    /// Output path, overridable from the command line.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// One scene as supplied by the script and fetch collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestScene {
    /// Narration chunk.
    pub text: String,

    #[serde(default)]
    pub visual_keywords: Vec<String>,

    /// Resolved media path, or null when the asset is unavailable.
    #[serde(default)]
    pub asset: Option<PathBuf>,

    /// Overrides extension-based image detection.
    #[serde(default)]
    pub is_image: Option<bool>,

    #[serde(default)]
    pub effect: Option<VisualEffect>,
}

/// Narration file and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestNarration {
    pub path: PathBuf,

    /// Measured duration of each synthesized chunk, one per scene.
    #[serde(default)]
    pub chunk_durations: Option<Vec<f64>>,

    /// Total narration duration when per-chunk values are not known.
    #[serde(default)]
    pub total_duration: Option<f64>,
}

/// Inline cue list or a caption file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CueSource {
    File { file: PathBuf },
    Inline(Vec<SubtitleCue>),
}

/// A manifest together with the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// Directory relative paths resolve against.
    pub base_dir: PathBuf,

    pub manifest: RenderManifest,
}

impl LoadedManifest {
    /// Load and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest: RenderManifest =
            serde_json::from_str(&content).map_err(|e| ManifestError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let loaded = Self { base_dir, manifest };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Structural checks that do not touch the filesystem.
    ///
    /// An empty scene list is accepted here; the job itself rejects it.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let narration = &self.manifest.narration;
        if let Some(chunks) = &narration.chunk_durations {
            if chunks.len() != self.manifest.scenes.len() {
                return Err(ManifestError::ValidationError {
                    message: format!(
                        "{} chunk durations for {} scenes",
                        chunks.len(),
                        self.manifest.scenes.len()
                    ),
                });
            }
        }
        if let Some(total) = narration.total_duration {
            if !total.is_finite() || total <= 0.0 {
                return Err(ManifestError::ValidationError {
                    message: format!("total narration duration must be positive, got {total}"),
                });
            }
        }
        for (i, overlay) in self.manifest.overlays.iter().enumerate() {
            if overlay.end <= overlay.start {
                return Err(ManifestError::ValidationError {
                    message: format!(
                        "overlay {i} ends at {} before it starts at {}",
                        overlay.end, overlay.start
                    ),
                });
            }
        }
        Ok(())
    }

    /// Resolve a manifest path against the manifest directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Scenes with resolved asset paths.
    pub fn scenes(&self) -> Vec<Scene> {
        self.manifest
            .scenes
            .iter()
            .enumerate()
            .map(|(id, s)| {
                let asset = s.asset.as_deref().map(|p| self.resolve(p));
                let is_image = s
                    .is_image
                    .unwrap_or_else(|| asset.as_deref().map(is_image_path).unwrap_or(false));
                Scene {
                    visual_keywords: s.visual_keywords.clone(),
                    asset,
                    is_image,
                    effect: s.effect,
                    ..Scene::new(id, s.text.clone())
                }
            })
            .collect()
    }

    /// Timing mode implied by the narration block. Per-chunk durations win
    /// over a total.
    pub fn narration_timing(&self) -> NarrationTiming {
        let narration = &self.manifest.narration;
        match (&narration.chunk_durations, narration.total_duration) {
            (Some(chunks), _) => NarrationTiming::PerChunk(chunks.clone()),
            (None, Some(total)) => NarrationTiming::Total(total),
            (None, None) => NarrationTiming::Measured,
        }
    }

    /// Bookend with a resolved path. A missing caption is read from a
    /// sibling `<stem>.txt` file when one exists.
    pub fn bookend(&self, clip: &BookendClip) -> BookendClip {
        let path = self.resolve(&clip.path);
        let caption = clip
            .caption
            .clone()
            .or_else(|| read_sibling_caption(&path));
        BookendClip { path, caption }
    }

    pub fn cue_input(&self) -> CueInput {
        match &self.manifest.cues {
            None => CueInput::FromNarration,
            Some(CueSource::Inline(cues)) => CueInput::Inline(cues.clone()),
            Some(CueSource::File { file }) => CueInput::File(self.resolve(file)),
        }
    }

    /// Build a job from the manifest. `output` overrides the manifest's
    /// own output path; the fallback is `output.mp4` beside the manifest.
    pub fn to_job(&self, output: Option<PathBuf>) -> RenderJob {
        let output_path = output
            .or_else(|| self.manifest.output.as_deref().map(|p| self.resolve(p)))
            .unwrap_or_else(|| self.base_dir.join("output.mp4"));

        let mut job = RenderJob::new(
            self.scenes(),
            AudioSegment::new(self.resolve(&self.manifest.narration.path)),
            self.narration_timing(),
            output_path,
        );
        job.intro = self.manifest.intro.as_ref().map(|c| self.bookend(c));
        job.outro = self.manifest.outro.as_ref().map(|c| self.bookend(c));
        job.cues = self.cue_input();
        job.overlays = self
            .manifest
            .overlays
            .iter()
            .map(|o| OverlaySpec {
                path: self.resolve(&o.path),
                ..o.clone()
            })
            .collect();
        job
    }

    /// Paths referenced by the manifest that do not exist.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.resolve(&self.manifest.narration.path)];
        paths.extend(
            self.manifest
                .scenes
                .iter()
                .filter_map(|s| s.asset.as_deref().map(|p| self.resolve(p))),
        );
        paths.extend(
            [&self.manifest.intro, &self.manifest.outro]
                .into_iter()
                .flatten()
                .map(|c| self.resolve(&c.path)),
        );
        if let Some(CueSource::File { file }) = &self.manifest.cues {
            paths.push(self.resolve(file));
        }
        paths.extend(self.manifest.overlays.iter().map(|o| self.resolve(&o.path)));
        paths.into_iter().filter(|p| !p.exists()).collect()
    }
}

fn read_sibling_caption(media: &Path) -> Option<String> {
    let text = std::fs::read_to_string(media.with_extension("txt")).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Errors that can occur when loading manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid manifest: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "scenes": [
            { "text": "First scene", "asset": "media/a.mp4" },
            { "text": "Second", "asset": "media/b.png", "effect": "pan" },
            { "text": "Third", "asset": null }
        ],
        "narration": { "path": "narration.mp3", "total_duration": 12.5 },
        "intro": { "path": "intro.mp4" },
        "outro": { "path": "/abs/outro.mp4", "caption": "Bye" },
        "cues": { "file": "subs.srt" }
    }"#;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("manifest.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedManifest::load(write_manifest(dir.path(), MANIFEST)).unwrap();

        let scenes = loaded.scenes();
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].asset, Some(dir.path().join("media/a.mp4")));
        assert!(!scenes[0].is_image);
        assert!(scenes[1].is_image);
        assert_eq!(scenes[1].effect, Some(VisualEffect::Pan));
        assert_eq!(scenes[2].asset, None);
        assert_eq!(scenes[2].id, 2);

        assert_eq!(loaded.narration_timing(), NarrationTiming::Total(12.5));
        assert_eq!(
            loaded.cue_input(),
            CueInput::File(dir.path().join("subs.srt"))
        );
    }

    #[test]
    fn test_sibling_caption_file_fills_missing_caption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("intro.txt"), "  Hola a todos \n").unwrap();
        let loaded = LoadedManifest::load(write_manifest(dir.path(), MANIFEST)).unwrap();

        let job = loaded.to_job(None);
        let intro = job.intro.unwrap();
        assert_eq!(intro.caption.as_deref(), Some("Hola a todos"));
        let outro = job.outro.unwrap();
        assert_eq!(outro.path, PathBuf::from("/abs/outro.mp4"));
        assert_eq!(outro.caption.as_deref(), Some("Bye"));
        assert_eq!(job.output_path, dir.path().join("output.mp4"));
    }

    #[test]
    fn test_chunk_count_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{
            "scenes": [{ "text": "a" }, { "text": "b" }],
            "narration": { "path": "n.wav", "chunk_durations": [1.0] }
        }"#;
        let err = LoadedManifest::load(write_manifest(dir.path(), body)).unwrap_err();
        assert!(matches!(err, ManifestError::ValidationError { .. }));
    }

    #[test]
    fn test_inline_cues_and_measured_timing() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{
            "scenes": [{ "text": "a" }],
            "narration": { "path": "n.wav" },
            "cues": [{ "start": 0.0, "end": 1.0, "text": "hi", "animation": "pop" }]
        }"#;
        let loaded = LoadedManifest::load(write_manifest(dir.path(), body)).unwrap();
        assert_eq!(loaded.narration_timing(), NarrationTiming::Measured);
        match loaded.cue_input() {
            CueInput::Inline(cues) => assert_eq!(cues[0].text, "hi"),
            other => panic!("unexpected cue input: {other:?}"),
        }
    }

    #[test]
    fn test_missing_files_lists_absent_inputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("narration.mp3"), b"").unwrap();
        let loaded = LoadedManifest::load(write_manifest(dir.path(), MANIFEST)).unwrap();
        let missing = loaded.missing_files();
        assert!(!missing.contains(&dir.path().join("narration.mp3")));
        assert!(missing.contains(&dir.path().join("media/a.mp4")));
        assert!(missing.contains(&dir.path().join("subs.srt")));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), "{ not json");
        let err = LoadedManifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("manifest.json"));
    }
}
