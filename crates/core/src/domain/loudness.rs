//! Approximate loudness matching between source and reference
//!
//! This is an RMS heuristic, not a standards-compliant loudness measurement.

use crate::domain::audio::AudioBuffer;
use tracing::debug;

/// Lowest correction gain the matcher will return
pub const MIN_CORRECTION: f32 = 0.1;

/// Highest correction gain the matcher will return
pub const MAX_CORRECTION: f32 = 10.0;

/// Root-mean-square over every sample of every channel
pub fn rms(buffer: &AudioBuffer) -> f32 {
    let count = buffer.frames() * buffer.num_channels();
    if count == 0 {
        return 0.0;
    }

    let sum: f64 = buffer
        .channels()
        .flat_map(|c| c.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    (sum / count as f64).sqrt() as f32
}

/// Gain that brings the reference to the source's RMS level
///
/// Returns 1.0 when either buffer is absent or the reference is silent.
pub fn compute_correction(source: Option<&AudioBuffer>, reference: Option<&AudioBuffer>) -> f32 {
    let (Some(source), Some(reference)) = (source, reference) else {
        return 1.0;
    };

    let reference_rms = rms(reference);
    if reference_rms == 0.0 {
        return 1.0;
    }

    (rms(source) / reference_rms).clamp(MIN_CORRECTION, MAX_CORRECTION)
}

/// Holds the matching flag and the derived reference gain
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessMatcher {
    enabled: bool,
    correction: f32,
}

impl LoudnessMatcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            correction: 1.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Gain for the reference path (1.0 when matching is off)
    pub fn correction(&self) -> f32 {
        self.correction
    }

    /// Recompute the correction from the current buffers
    pub fn recompute(&mut self, source: Option<&AudioBuffer>, reference: Option<&AudioBuffer>) -> f32 {
        self.correction = if self.enabled {
            compute_correction(source, reference)
        } else {
            1.0
        };
        debug!(
            enabled = self.enabled,
            correction = self.correction,
            "Loudness correction updated"
        );
        self.correction
    }
}

impl Default for LoudnessMatcher {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn constant(level: f32, channels: usize, frames: usize) -> AudioBuffer {
        AudioBuffer::new(44100, vec![vec![level; frames]; channels]).unwrap()
    }

    #[test]
    fn test_rms() {
        assert!((rms(&constant(0.5, 2, 100)) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&constant(0.0, 1, 10)), 0.0);
        assert_eq!(rms(&constant(0.3, 1, 0)), 0.0);

        // Across channels: sqrt((1 + 0) / 2)
        let mixed = AudioBuffer::new(44100, vec![vec![1.0; 4], vec![0.0; 4]]).unwrap();
        assert!((rms(&mixed) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_correction_neutral_cases() {
        let source = constant(0.5, 2, 100);
        let silent = constant(0.0, 2, 100);

        assert_eq!(compute_correction(None, Some(&source)), 1.0);
        assert_eq!(compute_correction(Some(&source), None), 1.0);
        assert_eq!(compute_correction(None, None), 1.0);
        assert_eq!(compute_correction(Some(&source), Some(&silent)), 1.0);
    }

    #[test]
    fn test_correction_ratio_and_clamp() {
        let source = constant(0.4, 1, 100);
        let reference = constant(0.2, 2, 50);
        assert!((compute_correction(Some(&source), Some(&reference)) - 2.0).abs() < 1e-5);

        let quiet = constant(0.001, 1, 100);
        assert_eq!(compute_correction(Some(&source), Some(&quiet)), MAX_CORRECTION);
        assert_eq!(compute_correction(Some(&quiet), Some(&source)), MIN_CORRECTION);
    }

    #[test]
    fn test_matcher_disabled_is_unity() {
        let source = constant(0.4, 1, 100);
        let reference = constant(0.2, 1, 100);

        let mut matcher = LoudnessMatcher::new(false);
        assert_eq!(matcher.recompute(Some(&source), Some(&reference)), 1.0);

        matcher.set_enabled(true);
        assert!((matcher.recompute(Some(&source), Some(&reference)) - 2.0).abs() < 1e-5);
        assert!(matcher.is_enabled());
    }

    proptest! {
        #[test]
        fn prop_correction_within_bounds(
            src in proptest::collection::vec(-1.0f32..=1.0, 1..128),
            reference in proptest::collection::vec(-1.0f32..=1.0, 1..128),
        ) {
            let src = AudioBuffer::new(44100, vec![src]).unwrap();
            let reference = AudioBuffer::new(44100, vec![reference]).unwrap();
            let gain = compute_correction(Some(&src), Some(&reference));

            prop_assert!((MIN_CORRECTION..=MAX_CORRECTION).contains(&gain));
        }
    }
}
