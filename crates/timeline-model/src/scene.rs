//! Scenes and visual effects.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// One narration chunk paired with a visual asset and a time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Position of the scene in the script (zero-based).
    pub id: usize,

    /// Narration text spoken over this scene.
    pub narration: String,

    /// Search keywords the asset was fetched with.
    #[serde(default)]
    pub visual_keywords: Vec<String>,

    /// Local media path, or `None` when the fetch collaborator reported
    /// the asset unavailable.
    pub asset: Option<PathBuf>,

    /// Whether the asset is a still image.
    #[serde(default)]
    pub is_image: bool,

    /// Motion effect for still images. `None` uses the job default.
    #[serde(default)]
    pub effect: Option<VisualEffect>,

    /// Allocated duration (seconds).
    #[serde(default)]
    pub duration: f64,

    /// Start on the narration timeline (seconds).
    #[serde(default)]
    pub start_time: f64,

    /// End on the narration timeline (seconds).
    #[serde(default)]
    pub end_time: f64,
}

impl Scene {
    pub fn new(id: usize, narration: impl Into<String>) -> Self {
        Self {
            id,
            narration: narration.into(),
            visual_keywords: Vec::new(),
            asset: None,
            is_image: false,
            effect: None,
            duration: 0.0,
            start_time: 0.0,
            end_time: 0.0,
        }
    }

    /// Attach an asset, inferring `is_image` from the extension.
    pub fn with_asset(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.is_image = is_image_path(&path);
        self.asset = Some(path);
        self
    }

    pub fn with_effect(mut self, effect: VisualEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Character count used for proportional timing.
    pub fn char_count(&self) -> usize {
        self.narration.trim().chars().count()
    }
}

/// Whether a path looks like a still image.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Motion applied to a still image to turn it into a clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualEffect {
    /// Slow zoom-in toward the center.
    #[default]
    Zoom,
    /// Horizontal pan across the image.
    Pan,
    /// Zoom-out combined with a gentle drift.
    KenBurns,
    /// Scale and center-crop only.
    Static,
}

impl VisualEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zoom => "zoom",
            Self::Pan => "pan",
            Self::KenBurns => "kenburns",
            Self::Static => "static",
        }
    }
}

impl FromStr for VisualEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zoom" => Ok(Self::Zoom),
            "pan" => Ok(Self::Pan),
            "kenburns" | "ken-burns" => Ok(Self::KenBurns),
            "static" | "none" => Ok(Self::Static),
            other => Err(format!(
                "Unknown effect: {other}. Use: zoom, pan, kenburns, static"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_detection_by_extension() {
        assert!(is_image_path(Path::new("a/b/photo.JPG")));
        assert!(is_image_path(Path::new("still.webp")));
        assert!(!is_image_path(Path::new("clip.mp4")));
        assert!(!is_image_path(Path::new("no_extension")));
    }

    #[test]
    fn test_with_asset_sets_image_flag() {
        let scene = Scene::new(0, "hello").with_asset("cover.png");
        assert!(scene.is_image);
        let scene = Scene::new(1, "hello").with_asset("broll.mov");
        assert!(!scene.is_image);
    }

    #[test]
    fn test_char_count_ignores_surrounding_whitespace() {
        assert_eq!(Scene::new(0, "  héllo  ").char_count(), 5);
        assert_eq!(Scene::new(0, "").char_count(), 0);
    }

    #[test]
    fn test_effect_parsing() {
        assert_eq!("KenBurns".parse::<VisualEffect>(), Ok(VisualEffect::KenBurns));
        assert_eq!("pan".parse::<VisualEffect>(), Ok(VisualEffect::Pan));
        assert!("spin".parse::<VisualEffect>().is_err());
        let json = serde_json::to_string(&VisualEffect::KenBurns).unwrap();
        assert_eq!(json, "\"kenburns\"");
    }
}
