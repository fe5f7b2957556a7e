//! Subtitle cue timeline.
//!
//! Main cues arrive relative to the narration start. The builder repairs
//! them (negative starts, inverted or zero-length cues, overlaps), shifts
//! them past the intro, and wraps them with an intro and an outro caption.
//! Repairs are reported and logged; none of them fail the job.

use serde::Serialize;

use reelsmith_timeline_model::cue::{CueAnimation, CueStyle, SubtitleCue, MIN_CUE_DURATION};
use reelsmith_timeline_model::scene::Scene;

/// Overlap allowed between adjacent cues before the earlier one is trimmed.
pub const CUE_ORDER_TOLERANCE: f64 = MIN_CUE_DURATION;

/// Fixed inputs of the builder, from configuration.
#[derive(Debug, Clone)]
pub struct CueTimelineSettings {
    /// Intro caption when the intro has none.
    pub intro_fallback: String,

    /// Outro caption when the outro has none.
    pub outro_fallback: String,

    /// Gap between the intro caption end and the intro clip end.
    pub intro_gap: f64,

    /// Gap between the last main cue and the outro caption.
    pub outro_gap: f64,

    /// Animation of the intro and outro captions.
    pub bookend_animation: Option<CueAnimation>,
}

impl Default for CueTimelineSettings {
    fn default() -> Self {
        Self {
            intro_fallback: "Welcome".to_string(),
            outro_fallback: "Follow for more".to_string(),
            intro_gap: 0.5,
            outro_gap: 0.5,
            bookend_animation: Some(CueAnimation::Fade),
        }
    }
}

/// A repair applied to an input cue. Indices refer to the input list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CueRepair {
    ClampedStart { index: usize, original: f64 },
    ExtendedEnd { index: usize, original: f64 },
    TrimmedOverlap { index: usize, trimmed_by: f64 },
}

/// The final cue list plus what was repaired on the way.
#[derive(Debug, Clone, Default)]
pub struct CueTimeline {
    pub cues: Vec<SubtitleCue>,
    pub repairs: Vec<CueRepair>,
}

impl CueTimeline {
    /// End of the last cue, or zero for an empty timeline.
    pub fn end(&self) -> f64 {
        self.cues.iter().map(|c| c.end).fold(0.0, f64::max)
    }
}

/// Builds the final cue timeline.
#[derive(Debug, Clone, Default)]
pub struct SubtitleTimelineBuilder {
    settings: CueTimelineSettings,
}

impl SubtitleTimelineBuilder {
    pub fn new(settings: CueTimelineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CueTimelineSettings {
        &self.settings
    }

    /// Merge intro caption, main cues and outro caption.
    ///
    /// A zero `intro_duration`/`outro_duration` means the bookend is absent
    /// and no caption is produced for it. The first cue of the result gets
    /// the highlight style unless it already carries a non-default style.
    pub fn build(
        &self,
        main_cues: &[SubtitleCue],
        intro_text: Option<&str>,
        outro_text: Option<&str>,
        intro_duration: f64,
        outro_duration: f64,
    ) -> CueTimeline {
        let (main, repairs) = repair_cues(main_cues);

        let mut cues = Vec::with_capacity(main.len() + 2);

        if let Some(intro) = self.intro_cue(intro_text, intro_duration) {
            cues.push(intro);
        }

        let shifted: Vec<SubtitleCue> = main.iter().map(|c| c.shifted(intro_duration)).collect();
        let last_main_end = shifted
            .iter()
            .map(|c| c.end)
            .fold(intro_duration.max(0.0), f64::max);
        cues.extend(shifted);

        if outro_duration > 0.0 {
            let start = last_main_end + self.settings.outro_gap;
            let text = non_empty(outro_text).unwrap_or(&self.settings.outro_fallback);
            cues.push(
                SubtitleCue::new(start, start + outro_duration, text)
                    .with_animation(self.settings.bookend_animation),
            );
        }

        if let Some(first) = cues.first_mut() {
            if first.style == CueStyle::Default {
                first.style = CueStyle::Highlight;
            }
        }

        let violations = count_order_violations(&cues);
        if violations > 0 {
            tracing::warn!(violations, "Cue timeline has ordering violations");
        }

        tracing::debug!(
            cues = cues.len(),
            repairs = repairs.len(),
            intro_duration,
            outro_duration,
            "Built cue timeline"
        );
        CueTimeline { cues, repairs }
    }

    fn intro_cue(&self, intro_text: Option<&str>, intro_duration: f64) -> Option<SubtitleCue> {
        if intro_duration < MIN_CUE_DURATION {
            if intro_duration > 0.0 {
                tracing::warn!(intro_duration, "Intro too short for a caption, skipping");
            }
            return None;
        }
        let mut end = intro_duration - self.settings.intro_gap;
        if end < MIN_CUE_DURATION {
            end = intro_duration;
        }
        let text = non_empty(intro_text).unwrap_or(&self.settings.intro_fallback);
        Some(SubtitleCue::new(0.0, end, text).with_animation(self.settings.bookend_animation))
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Clamp, sort and de-overlap main cues.
fn repair_cues(input: &[SubtitleCue]) -> (Vec<SubtitleCue>, Vec<CueRepair>) {
    let mut repairs = Vec::new();
    let mut indexed: Vec<(usize, SubtitleCue)> = input.iter().cloned().enumerate().collect();

    for (index, cue) in indexed.iter_mut() {
        if cue.start < 0.0 {
            tracing::warn!(cue = *index, start = cue.start, "Cue starts before zero, clamping");
            repairs.push(CueRepair::ClampedStart {
                index: *index,
                original: cue.start,
            });
            cue.start = 0.0;
        }
        if cue.end <= cue.start {
            tracing::warn!(
                cue = *index,
                start = cue.start,
                end = cue.end,
                "Inverted or zero-length cue, extending to minimum duration"
            );
            repairs.push(CueRepair::ExtendedEnd {
                index: *index,
                original: cue.end,
            });
            cue.end = cue.start + MIN_CUE_DURATION;
        }
    }

    // Stable: cues sharing a start keep their input order.
    indexed.sort_by(|a, b| a.1.start.total_cmp(&b.1.start));

    for i in 0..indexed.len().saturating_sub(1) {
        let next_start = indexed[i + 1].1.start;
        let (index, cue) = &mut indexed[i];
        if cue.end > next_start + CUE_ORDER_TOLERANCE {
            let new_end = next_start.max(cue.start + MIN_CUE_DURATION);
            tracing::warn!(
                cue = *index,
                end = cue.end,
                next_start,
                "Cue overlaps the next one, trimming"
            );
            repairs.push(CueRepair::TrimmedOverlap {
                index: *index,
                trimmed_by: cue.end - new_end,
            });
            cue.end = new_end;
        }
    }

    (indexed.into_iter().map(|(_, c)| c).collect(), repairs)
}

/// Adjacent pairs where a cue ends later than the next starts, beyond
/// [`CUE_ORDER_TOLERANCE`].
pub fn count_order_violations(cues: &[SubtitleCue]) -> usize {
    cues.windows(2)
        .filter(|pair| {
            pair[0].end > pair[1].start + CUE_ORDER_TOLERANCE
                || pair[1].start < pair[0].start - CUE_ORDER_TOLERANCE
        })
        .count()
}

/// Derive main cues from narration when no cue list was supplied.
///
/// Each scene's narration is cut into phrases of `words_per_cue` words,
/// and the scene's slot is shared between its phrases by character count.
/// Cue times are relative to the narration start.
pub fn cues_from_scenes(
    scenes: &[Scene],
    words_per_cue: usize,
    animation: Option<CueAnimation>,
) -> Vec<SubtitleCue> {
    let words_per_cue = words_per_cue.max(1);
    let mut cues = Vec::new();

    for scene in scenes {
        let words: Vec<&str> = scene.narration.split_whitespace().collect();
        if words.is_empty() || scene.duration <= 0.0 {
            continue;
        }
        let phrases: Vec<String> = words.chunks(words_per_cue).map(|c| c.join(" ")).collect();
        let weights: Vec<f64> = phrases
            .iter()
            .map(|p| p.chars().count().max(1) as f64)
            .collect();
        let total_weight: f64 = weights.iter().sum();

        let mut cursor = scene.start_time;
        for (i, (phrase, weight)) in phrases.into_iter().zip(&weights).enumerate() {
            let end = if i + 1 == weights.len() {
                scene.start_time + scene.duration
            } else {
                cursor + scene.duration * weight / total_weight
            };
            cues.push(SubtitleCue::new(cursor, end, phrase).with_animation(animation));
            cursor = end;
        }
    }
    cues
}
