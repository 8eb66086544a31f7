//! Segment-level time stretching: identity, interpolation, or WSOLA.

use crate::core::resample::resample_catmull_rom;
use crate::core::types::rms;
use crate::error::StretchError;
use crate::stretch::params::{StretchMode, WsolaConfig};
use crate::stretch::wsola::Wsola;

/// Below this RMS a signal is treated as silent and left unscaled.
const NORMALIZE_RMS_FLOOR: f32 = 1e-8;

/// Changes the length of audio segments by a stretch factor.
///
/// A factor above 1.0 lengthens (slows down), below 1.0 shortens. Degenerate
/// requests (empty input, non-positive or non-finite factor, factor within
/// the identity epsilon of 1.0) return the input unchanged rather than an
/// error, so per-segment callers never have to special-case them.
#[derive(Debug)]
pub struct TimeStretchProcessor {
    wsola: Wsola,
}

impl Default for TimeStretchProcessor {
    fn default() -> Self {
        Self::new(WsolaConfig::default())
    }
}

impl TimeStretchProcessor {
    /// Creates a processor with the given frame layout, without validating
    /// it. A layout WSOLA cannot run with makes every segment take the
    /// interpolation fallback; use [`try_new`](Self::try_new) to reject it
    /// up front.
    pub fn new(config: WsolaConfig) -> Self {
        Self {
            wsola: Wsola::new(config),
        }
    }

    /// Creates a processor after validating the frame layout.
    pub fn try_new(config: WsolaConfig) -> Result<Self, StretchError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Returns the frame layout.
    #[inline]
    pub fn config(&self) -> &WsolaConfig {
        self.wsola.config()
    }

    /// Stretches one mono segment.
    pub fn process_segment(&mut self, input: &[f32], factor: f32, preserve_pitch: bool) -> Vec<f32> {
        self.process_with_mode(input, factor, StretchMode::from_preserve_pitch(preserve_pitch))
    }

    /// Stretches one mono segment with an explicit mode.
    pub fn process_with_mode(&mut self, input: &[f32], factor: f32, mode: StretchMode) -> Vec<f32> {
        if input.is_empty() || !factor.is_finite() || factor <= 0.0 {
            return input.to_vec();
        }
        if (factor - 1.0).abs() < self.config().identity_epsilon {
            return input.to_vec();
        }

        let target_len = (input.len() as f64 * factor as f64).round() as usize;
        match mode {
            StretchMode::SimpleInterpolation => resample_catmull_rom(input, target_len),
            StretchMode::PitchPreserving => {
                let mut output = match self.wsola.process(input, factor) {
                    Some(output) => output,
                    None => {
                        log::debug!(
                            "stretch: {} samples at factor {:.4} outside WSOLA layout, interpolating",
                            input.len(),
                            factor
                        );
                        resample_catmull_rom(input, target_len)
                    }
                };
                normalize_rms(&mut output, rms(input));
                output
            }
        }
    }

    /// Stretches each channel independently.
    ///
    /// Output channels may differ in length by a sample or two when input
    /// channels already did.
    pub fn process_channels(
        &mut self,
        channels: &[Vec<f32>],
        factor: f32,
        preserve_pitch: bool,
    ) -> Vec<Vec<f32>> {
        channels
            .iter()
            .map(|ch| self.process_segment(ch, factor, preserve_pitch))
            .collect()
    }
}

/// Scales output so its RMS matches `target_rms`, if both have sufficient energy.
#[inline]
fn normalize_rms(output: &mut [f32], target_rms: f32) {
    let output_rms = rms(output);
    if output_rms < NORMALIZE_RMS_FLOOR || target_rms < NORMALIZE_RMS_FLOOR {
        return;
    }
    let gain = target_rms / output_rms;
    for s in output.iter_mut() {
        *s *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_identity_returns_input() {
        let mut processor = TimeStretchProcessor::default();
        let input = noise(10_000, 7);
        assert_eq!(processor.process_segment(&input, 1.0, true), input);
        assert_eq!(processor.process_segment(&input, 1.0005, false), input);
    }

    #[test]
    fn test_degenerate_factors_return_input() {
        let mut processor = TimeStretchProcessor::default();
        let input = noise(5000, 3);
        assert_eq!(processor.process_segment(&input, 0.0, true), input);
        assert_eq!(processor.process_segment(&input, -1.5, true), input);
        assert_eq!(processor.process_segment(&input, f32::NAN, false), input);
        assert_eq!(processor.process_segment(&input, f32::INFINITY, true), input);
        assert!(processor.process_segment(&[], 1.5, true).is_empty());
    }

    #[test]
    fn test_length_law_both_modes() {
        let mut processor = TimeStretchProcessor::default();
        for &len in &[10usize, 1000, 4095, 4096, 30_000] {
            let input = noise(len, len as u32);
            for &factor in &[0.3f32, 0.8, 1.1, 1.5, 2.0, 3.0] {
                let expected = (len as f64 * factor as f64).round() as usize;
                for &preserve in &[true, false] {
                    let out = processor.process_segment(&input, factor, preserve);
                    assert_eq!(
                        out.len(),
                        expected,
                        "len {} factor {} preserve {}",
                        len,
                        factor,
                        preserve
                    );
                }
            }
        }
    }

    #[test]
    fn test_pitch_preserving_matches_input_rms() {
        let mut processor = TimeStretchProcessor::default();
        let input = noise(40_000, 11);
        let input_rms = rms(&input);
        for &factor in &[0.6f32, 1.3, 2.5] {
            let out = processor.process_segment(&input, factor, true);
            let out_rms = rms(&out);
            assert!(
                (out_rms - input_rms).abs() / input_rms < 0.01,
                "factor {}: rms {} vs {}",
                factor,
                out_rms,
                input_rms
            );
        }
    }

    #[test]
    fn test_process_channels_independent() {
        let mut processor = TimeStretchProcessor::default();
        let left = noise(8000, 1);
        let right = noise(8001, 2);
        let out = processor.process_channels(&[left.clone(), right], 1.5, true);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 12_000);
        assert_eq!(out[1].len(), 12_002);
        assert_eq!(out[0], processor.process_segment(&left, 1.5, true));
    }

    #[test]
    fn test_try_new_validates() {
        assert!(TimeStretchProcessor::try_new(WsolaConfig::default()).is_ok());
        assert!(TimeStretchProcessor::try_new(WsolaConfig::default().with_window_size(1)).is_err());
    }

    #[test]
    fn test_unvalidated_layout_falls_back_to_interpolation() {
        let config = WsolaConfig::default().with_window_size(1);
        assert!(config.validate().is_err());
        let mut processor = TimeStretchProcessor::new(config);
        let input = noise(5000, 5);
        let out = processor.process_segment(&input, 1.5, true);
        assert_eq!(out.len(), 7500);
        assert!((rms(&out) - rms(&input)).abs() / rms(&input) < 0.01);
    }
}
