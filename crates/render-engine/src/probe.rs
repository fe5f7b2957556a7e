//! Media measurement through ffprobe and ffmpeg analysis filters.

use std::path::Path;

use serde::Deserialize;

use reelsmith_common::error::{ReelError, ReelResult};

use crate::tool::{ffprobe_json, CancelSignal, FfmpegCommand, ToolRunner};

/// What the pipeline needs to know about a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Container duration.
    pub format_duration: Option<f64>,
    /// Duration of the first video stream.
    pub video_duration: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Best overall duration: container first, then video stream.
    pub fn duration(&self) -> Option<f64> {
        self.format_duration.or(self.video_duration).filter(|d| *d > 0.0)
    }

    /// Best duration of the picture: video stream first, then container.
    pub fn picture_duration(&self) -> Option<f64> {
        self.video_duration.or(self.format_duration).filter(|d| *d > 0.0)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_secs(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &str) -> ReelResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        format_duration: probe.format.as_ref().and_then(|f| parse_secs(f.duration.as_ref())),
        video_duration: video.and_then(|s| parse_secs(s.duration.as_ref())),
        has_video: video.is_some(),
        has_audio,
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
    })
}

/// Probe `path` with ffprobe.
pub async fn probe_media(
    runner: &dyn ToolRunner,
    path: &Path,
    cancel: &CancelSignal,
) -> ReelResult<MediaInfo> {
    if !path.exists() {
        return Err(ReelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let output = runner.run(&ffprobe_json(path), cancel).await?;
    let info = parse_probe_output(&output.stdout)?;
    tracing::debug!(
        path = %path.display(),
        duration = ?info.duration(),
        has_audio = info.has_audio,
        "Probed media"
    );
    Ok(info)
}

/// Duration of `path`, failing when it cannot be determined.
pub async fn probe_duration(
    runner: &dyn ToolRunner,
    path: &Path,
    cancel: &CancelSignal,
) -> ReelResult<f64> {
    probe_media(runner, path, cancel)
        .await?
        .duration()
        .ok_or_else(|| ReelError::render(format!("no duration reported for {}", path.display())))
}

/// Parse the `mean_volume: -23.4 dB` line of a volumedetect run.
pub fn parse_mean_volume(stderr: &str) -> Option<f64> {
    stderr.lines().find_map(|line| {
        let (_, rest) = line.split_once("mean_volume:")?;
        let value = rest.trim().trim_end_matches("dB").trim();
        if value == "-inf" {
            return Some(f64::NEG_INFINITY);
        }
        value.parse().ok()
    })
}

/// Mean volume of the audio in `path`, in dB.
pub async fn mean_volume(
    runner: &dyn ToolRunner,
    path: &Path,
    cancel: &CancelSignal,
) -> ReelResult<f64> {
    let invocation = FfmpegCommand::analysis()
        .input(path)
        .no_video()
        .audio_filter("volumedetect")
        .into_invocation();
    let output = runner.run(&invocation, cancel).await?;
    parse_mean_volume(&output.stderr)
        .ok_or_else(|| ReelError::mix(format!("no mean volume reported for {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_with_audio() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 1920, "height": 1080, "duration": "4.966667"},
                {"index": 1, "codec_type": "audio", "duration": "5.012000"}
            ],
            "format": {"duration": "5.012000", "size": "1234"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.duration(), Some(5.012));
        assert_eq!(info.picture_duration(), Some(4.966667));
    }

    #[test]
    fn test_parse_probe_still_image() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 800, "height": 600}], "format": {"duration": "N/A"}}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.duration(), None);
    }

    #[test]
    fn test_parse_probe_rejects_garbage() {
        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn test_parse_mean_volume() {
        let stderr = "[Parsed_volumedetect_0 @ 0x5581] n_samples: 441000\n\
                      [Parsed_volumedetect_0 @ 0x5581] mean_volume: -23.4 dB\n\
                      [Parsed_volumedetect_0 @ 0x5581] max_volume: -4.0 dB\n";
        assert_eq!(parse_mean_volume(stderr), Some(-23.4));
        assert_eq!(
            parse_mean_volume("mean_volume: -inf dB"),
            Some(f64::NEG_INFINITY)
        );
        assert_eq!(parse_mean_volume("nothing here"), None);
    }
}
