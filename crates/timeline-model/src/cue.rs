//! Subtitle cues.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Shortest cue the timeline keeps, in seconds.
pub const MIN_CUE_DURATION: f64 = 0.1;

/// One timed caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Start (seconds).
    pub start: f64,

    /// End (seconds). Must be greater than `start`.
    pub end: f64,

    /// Caption text. Line breaks are kept as `\n`.
    pub text: String,

    /// Base style.
    #[serde(default)]
    pub style: CueStyle,

    /// Entrance animation, independent of the base style.
    #[serde(default)]
    pub animation: Option<CueAnimation>,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            style: CueStyle::Default,
            animation: None,
        }
    }

    pub fn with_style(mut self, style: CueStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_animation(mut self, animation: Option<CueAnimation>) -> Self {
        self.animation = animation;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Copy of the cue moved by `offset` seconds.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            ..self.clone()
        }
    }
}

/// Named base style of a cue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueStyle {
    /// Body captions.
    #[default]
    Default,
    /// Hook caption at the start of the video.
    Highlight,
    /// Occasional accent.
    Emphasis,
}

impl CueStyle {
    pub const ALL: [CueStyle; 3] = [Self::Default, Self::Highlight, Self::Emphasis];

    /// Name used in the style table of a cue script.
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Highlight => "Highlight",
            Self::Emphasis => "Emphasis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Per-cue entrance effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueAnimation {
    Fade,
    Pop,
    Slide,
}

impl CueAnimation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Pop => "pop",
            Self::Slide => "slide",
        }
    }

    /// Parse a configured animation name; "none" disables the animation.
    pub fn parse_optional(value: &str) -> Result<Option<Self>, String> {
        if value.trim().eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        value.parse().map(Some)
    }
}

impl FromStr for CueAnimation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fade" => Ok(Self::Fade),
            "pop" => Ok(Self::Pop),
            "slide" => Ok(Self::Slide),
            other => Err(format!(
                "Unknown animation: {other}. Use: fade, pop, slide, none"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_keeps_text_and_style() {
        let cue = SubtitleCue::new(1.0, 2.5, "hi").with_style(CueStyle::Emphasis);
        let moved = cue.shifted(3.0);
        assert_eq!(moved.start, 4.0);
        assert_eq!(moved.end, 5.5);
        assert_eq!(moved.text, "hi");
        assert_eq!(moved.style, CueStyle::Emphasis);
    }

    #[test]
    fn test_style_names() {
        assert_eq!(CueStyle::from_name("highlight"), Some(CueStyle::Highlight));
        assert_eq!(CueStyle::from_name("Default"), Some(CueStyle::Default));
        assert_eq!(CueStyle::from_name("Karaoke"), None);
    }

    #[test]
    fn test_animation_parsing() {
        assert_eq!(CueAnimation::parse_optional("none"), Ok(None));
        assert_eq!(CueAnimation::parse_optional("Pop"), Ok(Some(CueAnimation::Pop)));
        assert!(CueAnimation::parse_optional("wobble").is_err());
    }

    #[test]
    fn test_cue_json_defaults() {
        let cue: SubtitleCue =
            serde_json::from_str(r#"{ "start": 0.5, "end": 1.5, "text": "x" }"#).unwrap();
        assert_eq!(cue.style, CueStyle::Default);
        assert_eq!(cue.animation, None);
    }
}
