//! Scene timing allocation.
//!
//! Assigns `duration`, `start_time` and `end_time` to every scene so that
//! the durations sum to the narration length. With per-chunk durations the
//! slots come straight from the synthesized audio; with only a total the
//! total is split by narration length and the last scene absorbs the
//! rounding remainder.

use reelsmith_common::error::{ReelError, ReelResult};
use reelsmith_timeline_model::job::NarrationTiming;
use reelsmith_timeline_model::scene::Scene;

/// Shortest slot a scene is given.
pub const MIN_SCENE_DURATION: f64 = 0.1;

/// Allocates scene time slots from narration timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingAllocator;

impl TimingAllocator {
    /// Allocate slots for `scenes` and return the narration total.
    ///
    /// `measured_total` is the probed narration duration and is required
    /// for [`NarrationTiming::Measured`].
    pub fn allocate(
        &self,
        scenes: &mut [Scene],
        timing: &NarrationTiming,
        measured_total: Option<f64>,
    ) -> ReelResult<f64> {
        match timing {
            NarrationTiming::PerChunk(chunks) => self.allocate_exact(scenes, chunks),
            NarrationTiming::Total(total) => self.allocate_proportional(scenes, *total),
            NarrationTiming::Measured => {
                let total = measured_total.ok_or_else(|| {
                    ReelError::timing("narration duration was not measured")
                })?;
                self.allocate_proportional(scenes, total)
            }
        }
    }

    /// Exact mode: scene `i` lasts as long as synthesized chunk `i`.
    pub fn allocate_exact(&self, scenes: &mut [Scene], chunks: &[f64]) -> ReelResult<f64> {
        if scenes.is_empty() {
            return Err(ReelError::timing("no scenes"));
        }
        if chunks.len() != scenes.len() {
            return Err(ReelError::timing(format!(
                "{} chunk durations for {} scenes",
                chunks.len(),
                scenes.len()
            )));
        }

        let durations: Vec<f64> = chunks
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                if d.is_finite() && d >= MIN_SCENE_DURATION {
                    d
                } else {
                    tracing::warn!(
                        scene = i,
                        duration = d,
                        min = MIN_SCENE_DURATION,
                        "Chunk duration below minimum, clamping"
                    );
                    MIN_SCENE_DURATION
                }
            })
            .collect();

        Ok(place(scenes, &durations, None))
    }

    /// Proportional mode: split `total` by narration character count.
    ///
    /// Every scene weighs at least one character, so a scene with an empty
    /// chunk still gets a slot and an all-empty script splits evenly.
    pub fn allocate_proportional(&self, scenes: &mut [Scene], total: f64) -> ReelResult<f64> {
        if scenes.is_empty() {
            return Err(ReelError::timing("no scenes"));
        }
        if !total.is_finite() || total <= 0.0 {
            return Err(ReelError::timing(format!(
                "narration duration must be positive, got {total}"
            )));
        }

        let weights: Vec<f64> = scenes.iter().map(|s| s.char_count().max(1) as f64).collect();
        let total_weight: f64 = weights.iter().sum();

        let mut durations: Vec<f64> = weights[..weights.len() - 1]
            .iter()
            .map(|w| total * w / total_weight)
            .collect();
        let assigned: f64 = durations.iter().sum();
        durations.push(total - assigned);

        if durations.iter().any(|&d| d < MIN_SCENE_DURATION) {
            tracing::warn!(
                total,
                scenes = scenes.len(),
                "Narration too short for scene count; some slots are below {MIN_SCENE_DURATION}s"
            );
        }

        Ok(place(scenes, &durations, Some(total)))
    }
}

/// Write cumulative slots into the scenes. When `anchor_end` is given the
/// last scene ends exactly there.
fn place(scenes: &mut [Scene], durations: &[f64], anchor_end: Option<f64>) -> f64 {
    let mut cursor = 0.0;
    for (scene, &duration) in scenes.iter_mut().zip(durations) {
        scene.start_time = cursor;
        scene.duration = duration;
        cursor += duration;
        scene.end_time = cursor;
    }
    if let (Some(end), Some(last)) = (anchor_end, scenes.last_mut()) {
        last.end_time = end;
        cursor = end;
    }

    tracing::debug!(
        scenes = scenes.len(),
        total_secs = cursor,
        "Allocated scene timing"
    );
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenes_with_chars(counts: &[usize]) -> Vec<Scene> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &n)| Scene::new(i, "x".repeat(n)))
            .collect()
    }

    #[test]
    fn test_proportional_split_matches_char_ratio() {
        let mut scenes = scenes_with_chars(&[10, 20, 70]);
        let total = TimingAllocator
            .allocate_proportional(&mut scenes, 30.0)
            .unwrap();

        assert_eq!(total, 30.0);
        let durations: Vec<f64> = scenes.iter().map(|s| s.duration).collect();
        assert!((durations[0] - 3.0).abs() < 1e-9);
        assert!((durations[1] - 6.0).abs() < 1e-9);
        assert!((durations[2] - 21.0).abs() < 1e-9);
        assert!((durations.iter().sum::<f64>() - 30.0).abs() < 1e-9);
        assert_eq!(scenes[2].end_time, 30.0);
    }

    #[test]
    fn test_zero_chars_splits_evenly() {
        let mut scenes = scenes_with_chars(&[0, 0, 0, 0]);
        TimingAllocator
            .allocate_proportional(&mut scenes, 8.0)
            .unwrap();
        for scene in &scenes {
            assert!((scene.duration - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_no_scenes_is_timing_error() {
        let mut scenes: Vec<Scene> = Vec::new();
        let err = TimingAllocator
            .allocate(&mut scenes, &NarrationTiming::Total(30.0), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Timing error: no scenes");

        let err = TimingAllocator
            .allocate(&mut scenes, &NarrationTiming::PerChunk(vec![]), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Timing error: no scenes");
    }

    #[test]
    fn test_exact_mode_has_contiguous_slots() {
        let mut scenes = scenes_with_chars(&[5, 5, 5]);
        let total = TimingAllocator
            .allocate_exact(&mut scenes, &[1.25, 2.5, 3.75])
            .unwrap();

        assert_eq!(total, 7.5);
        assert_eq!(scenes[0].start_time, 0.0);
        assert_eq!(scenes[1].start_time, scenes[0].end_time);
        assert_eq!(scenes[2].start_time, scenes[1].end_time);
        assert_eq!(scenes[2].end_time, 7.5);
    }

    #[test]
    fn test_exact_mode_clamps_non_positive_chunks() {
        let mut scenes = scenes_with_chars(&[5, 5]);
        TimingAllocator
            .allocate_exact(&mut scenes, &[0.0, 2.0])
            .unwrap();
        assert_eq!(scenes[0].duration, MIN_SCENE_DURATION);
    }

    #[test]
    fn test_exact_mode_rejects_length_mismatch() {
        let mut scenes = scenes_with_chars(&[5, 5]);
        let err = TimingAllocator
            .allocate_exact(&mut scenes, &[1.0])
            .unwrap_err();
        assert!(matches!(err, ReelError::Timing { .. }));
    }

    #[test]
    fn test_measured_mode_requires_measurement() {
        let mut scenes = scenes_with_chars(&[5]);
        assert!(TimingAllocator
            .allocate(&mut scenes, &NarrationTiming::Measured, None)
            .is_err());
        let total = TimingAllocator
            .allocate(&mut scenes, &NarrationTiming::Measured, Some(4.2))
            .unwrap();
        assert_eq!(total, 4.2);
        assert_eq!(scenes[0].duration, 4.2);
    }

    #[test]
    fn test_non_positive_total_rejected() {
        let mut scenes = scenes_with_chars(&[5]);
        assert!(TimingAllocator
            .allocate_proportional(&mut scenes, 0.0)
            .is_err());
        assert!(TimingAllocator
            .allocate_proportional(&mut scenes, f64::NAN)
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_proportional_durations_sum_to_total(
            counts in prop::collection::vec(0usize..5_000, 1..40),
            total in 0.5f64..900.0,
        ) {
            let mut scenes = scenes_with_chars(&counts);
            TimingAllocator.allocate_proportional(&mut scenes, total).unwrap();

            let sum: f64 = scenes.iter().map(|s| s.duration).sum();
            prop_assert!((sum - total).abs() <= 1e-9 * total.max(1.0));
            prop_assert_eq!(scenes.last().unwrap().end_time, total);
            for pair in scenes.windows(2) {
                prop_assert!(pair[0].end_time <= pair[1].start_time + 1e-9);
            }
        }

        #[test]
        fn prop_dominant_scene_keeps_sum(
            small in 1usize..5,
            dominant in 10_000usize..100_000,
            total in 1.0f64..120.0,
        ) {
            let mut scenes = scenes_with_chars(&[small, dominant, small]);
            TimingAllocator.allocate_proportional(&mut scenes, total).unwrap();
            let sum: f64 = scenes.iter().map(|s| s.duration).sum();
            prop_assert!((sum - total).abs() <= 1e-9 * total);
        }
    }
}
