//! Timecode utilities.
//!
//! Every timeline value in Reelsmith is an `f64` number of seconds. This
//! module converts those values to the textual forms used by caption
//! files and to frame counts, and provides the tolerance comparisons used
//! when checking rendered durations against planned ones.

use std::time::Instant;

/// Default tolerance for comparing planned durations, in seconds.
pub const DURATION_EPSILON: f64 = 1e-6;

/// Format seconds as an ASS timestamp: `H:MM:SS.cc`.
///
/// Values are rounded to the nearest centisecond so that parsing the
/// result gives back the same centisecond value.
pub fn format_ass_timestamp(secs: f64) -> String {
    let total_cs = (secs.max(0.0) * 100.0).round() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs / 6_000) % 60;
    let seconds = (total_cs / 100) % 60;
    let cs = total_cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{cs:02}")
}

/// Parse an ASS timestamp (`H:MM:SS.cc`) into seconds.
pub fn parse_ass_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let (seconds, cs) = parts.next()?.split_once('.')?;
    if parts.next().is_some() || cs.len() != 2 {
        return None;
    }
    let seconds: u64 = seconds.parse().ok()?;
    let cs: u64 = cs.parse().ok()?;
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    let total_cs = ((hours * 60 + minutes) * 60 + seconds) * 100 + cs;
    Some(total_cs as f64 / 100.0)
}

/// Format seconds as an SRT timestamp: `HH:MM:SS,mmm`.
pub fn format_srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{ms:03}")
}

/// Parse an SRT timestamp (`HH:MM:SS,mmm`, `.` accepted as separator).
pub fn parse_srt_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    let (hms, ms) = value.split_once(|c: char| c == ',' || c == '.')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let ms: u64 = ms.parse().ok()?;
    Some((hours * 3600 + minutes * 60 + seconds) as f64 + ms as f64 / 1000.0)
}

/// Number of whole frames covering `secs` at `fps` (rounded to nearest).
pub fn secs_to_frames(secs: f64, fps: u32) -> u64 {
    (secs.max(0.0) * fps as f64).round() as u64
}

/// Duration in seconds of `frames` frames at `fps`.
pub fn frames_to_secs(frames: u64, fps: u32) -> f64 {
    if fps == 0 {
        return 0.0;
    }
    frames as f64 / fps as f64
}

/// Whether two durations agree within `tolerance` seconds.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Drift between a planned and a measured duration.
#[derive(Debug, Clone, Copy)]
pub struct DurationDrift {
    /// Planned duration (seconds).
    pub expected_secs: f64,
    /// Measured duration (seconds).
    pub measured_secs: f64,
}

impl DurationDrift {
    /// Drift in seconds (positive = measured is longer).
    pub fn drift_secs(&self) -> f64 {
        self.measured_secs - self.expected_secs
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1000.0
    }

    /// Whether drift exceeds the given number of frames at `fps`.
    pub fn exceeds_frames(&self, frames: u32, fps: u32) -> bool {
        self.drift_secs().abs() > frames_to_secs(frames as u64, fps) + DURATION_EPSILON
    }
}

/// Wall and monotonic start of a job, for reports.
#[derive(Debug, Clone)]
pub struct JobClock {
    started: Instant,
    started_wall: String,
}

impl JobClock {
    /// Start a clock anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Wall-clock start time (RFC 3339).
    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ass_timestamp() {
        assert_eq!(format_ass_timestamp(0.0), "0:00:00.00");
        assert_eq!(format_ass_timestamp(3.5), "0:00:03.50");
        assert_eq!(format_ass_timestamp(61.234), "0:01:01.23");
        assert_eq!(format_ass_timestamp(3725.999), "1:02:06.00");
        assert_eq!(format_ass_timestamp(-2.0), "0:00:00.00");
    }

    #[test]
    fn test_parse_ass_timestamp() {
        assert_eq!(parse_ass_timestamp("0:00:03.50"), Some(3.5));
        assert_eq!(parse_ass_timestamp("1:02:06.00"), Some(3726.0));
        assert_eq!(parse_ass_timestamp("0:61:00.00"), None);
        assert_eq!(parse_ass_timestamp("0:00:03.5"), None);
        assert_eq!(parse_ass_timestamp("garbage"), None);
    }

    #[test]
    fn test_ass_timestamp_round_trip_is_stable() {
        for cs in [0u64, 1, 99, 100, 6_000, 359_999, 360_001] {
            let secs = cs as f64 / 100.0;
            let parsed = parse_ass_timestamp(&format_ass_timestamp(secs)).unwrap();
            assert_eq!(format_ass_timestamp(parsed), format_ass_timestamp(secs));
        }
    }

    #[test]
    fn test_srt_timestamps() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(3661.5), "01:01:01,500");
        assert_eq!(parse_srt_timestamp("01:01:01,500"), Some(3661.5));
        assert_eq!(parse_srt_timestamp("00:00:02.250"), Some(2.25));
        assert_eq!(parse_srt_timestamp("00:02,250"), None);
    }

    #[test]
    fn test_frames_conversion() {
        assert_eq!(secs_to_frames(2.0, 30), 60);
        assert_eq!(secs_to_frames(0.49, 30), 15);
        assert!((frames_to_secs(45, 30) - 1.5).abs() < 1e-9);
        assert_eq!(frames_to_secs(10, 0), 0.0);
    }

    #[test]
    fn test_duration_drift() {
        let drift = DurationDrift {
            expected_secs: 30.0,
            measured_secs: 30.05,
        };
        assert!((drift.drift_ms() - 50.0).abs() < 1e-6);
        assert!(!drift.exceeds_frames(2, 30));
        assert!(drift.exceeds_frames(1, 30));
    }

    #[test]
    fn test_job_clock_elapsed() {
        let clock = JobClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.started_wall().is_empty());
    }
}
