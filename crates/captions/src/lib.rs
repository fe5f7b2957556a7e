//! Reelsmith Captions
//!
//! Caption styling and cue script formats:
//! - **Styles:** immutable Default/Highlight/Emphasis presets
//! - **ASS:** the burned-in cue script (write and parse)
//! - **SRT:** import of externally authored cues, export for reuse

pub mod ass;
pub mod srt;
pub mod styles;

pub use ass::{parse_ass, write_ass};
pub use srt::{parse_srt, write_srt};
pub use styles::{CaptionStyle, StyleSheet};

use std::path::{Path, PathBuf};

use reelsmith_timeline_model::cue::SubtitleCue;

/// Errors from reading or writing cue files.
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Unsupported caption format: {path}")]
    UnsupportedFormat { path: PathBuf },
}

/// Load cues from an `.srt`, `.ass` or `.ssa` file.
pub fn load_cue_file(path: &Path) -> Result<Vec<SubtitleCue>, CaptionError> {
    let format = CueFileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| CaptionError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let cues = match format {
        CueFileFormat::Srt => parse_srt(&content)?,
        CueFileFormat::Ass => parse_ass(&content)?,
    };
    tracing::debug!(path = %path.display(), cues = cues.len(), "Loaded cue file");
    Ok(cues)
}

/// Write cues to `path`, choosing the format from the extension.
/// `width`/`height` declare the canvas of an ASS script.
pub fn save_cue_file(
    path: &Path,
    cues: &[SubtitleCue],
    width: u32,
    height: u32,
    styles: &StyleSheet,
) -> Result<(), CaptionError> {
    let content = match CueFileFormat::from_path(path)? {
        CueFileFormat::Srt => write_srt(cues),
        CueFileFormat::Ass => write_ass(cues, width, height, styles),
    };
    std::fs::write(path, content).map_err(|e| CaptionError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CueFileFormat {
    Srt,
    Ass,
}

impl CueFileFormat {
    fn from_path(path: &Path) -> Result<Self, CaptionError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("srt") => Ok(Self::Srt),
            Some("ass") | Some("ssa") => Ok(Self::Ass),
            _ => Err(CaptionError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cues = vec![
            SubtitleCue::new(0.0, 1.5, "first"),
            SubtitleCue::new(1.5, 3.25, "second line"),
        ];

        for name in ["cues.srt", "cues.ass"] {
            let path = dir.path().join(name);
            save_cue_file(&path, &cues, 1080, 1920, &StyleSheet::standard()).unwrap();
            let loaded = load_cue_file(&path).unwrap();
            assert_eq!(loaded.len(), 2);
            assert_eq!(loaded[1].text, "second line");
            assert_eq!(loaded[1].end, 3.25);
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = load_cue_file(Path::new("cues.vtt")).unwrap_err();
        assert!(matches!(err, CaptionError::UnsupportedFormat { .. }));
    }
}
