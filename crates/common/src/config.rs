//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default render settings.
    pub render: RenderDefaults,

    /// Default caption settings.
    pub captions: CaptionDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default render parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Canvas width in pixels.
    pub width: u32,

    /// Canvas height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Crossfade between scenes in seconds. Zero selects plain concatenation.
    pub crossfade_secs: f64,

    /// Fade in/out applied to every normalized clip, in seconds.
    pub fade_secs: f64,

    /// Encoder preference: "auto", "hardware" or "software".
    pub encoder: String,

    /// Root under which per-job working directories are created.
    pub temp_root: PathBuf,

    /// Keep intermediates after a successful render.
    pub keep_temp: bool,

    /// Keep intermediates after a failed render.
    pub keep_temp_on_failure: bool,

    /// Per-process timeout for external tools, in seconds.
    pub tool_timeout_secs: Option<u64>,

    /// Upper bound on concurrent normalization processes.
    /// `None` uses the number of available cores.
    pub max_parallel_jobs: Option<usize>,
}

/// Default caption parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionDefaults {
    /// Intro caption used when the intro clip has no caption of its own.
    pub intro_text: String,

    /// Outro caption used when the outro clip has no caption of its own.
    pub outro_text: String,

    /// Entrance animation for main cues: "fade", "pop", "slide" or "none".
    pub animation: String,

    /// Words per cue when captions are derived from narration text.
    pub words_per_cue: usize,

    /// Gap between the last main cue and the outro caption, in seconds.
    pub outro_gap_secs: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelsmith=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            render: RenderDefaults::default(),
            captions: CaptionDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            crossfade_secs: 0.0,
            fade_secs: 0.5,
            encoder: "auto".to_string(),
            temp_root: std::env::temp_dir().join("reelsmith"),
            keep_temp: false,
            keep_temp_on_failure: true,
            tool_timeout_secs: Some(1800),
            max_parallel_jobs: None,
        }
    }
}

impl Default for CaptionDefaults {
    fn default() -> Self {
        Self {
            intro_text: "Welcome".to_string(),
            outro_text: "Follow for more".to_string(),
            animation: "fade".to_string(),
            words_per_cue: 3,
            outro_gap_secs: 0.5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelsmith").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_vertical_canvas() {
        let config = AppConfig::default();
        assert_eq!((config.render.width, config.render.height), (1080, 1920));
        assert_eq!(config.render.fps, 30);
        assert!((config.render.fade_secs - 0.5).abs() < 1e-9);
        assert_eq!(config.captions.words_per_cue, 3);
    }

    #[test]
    fn test_partial_config_fills_missing_fields() {
        let json = r#"{ "render": { "fps": 25 }, "captions": { "intro_text": "Hola" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.render.fps, 25);
        assert_eq!(config.render.width, 1080);
        assert_eq!(config.captions.intro_text, "Hola");
        assert_eq!(config.captions.outro_text, "Follow for more");
        assert_eq!(config.logging.level, "info");
    }
}
