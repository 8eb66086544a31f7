//! Percussive onset classification for beat visualization.

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::analysis::envelope::{energy_envelope, find_peaks, ENVELOPE_WINDOW, PEAK_RADIUS};
use crate::core::fft::{dominant_frequency, magnitude_spectrum};
use crate::core::types::mix_to_mono;
use crate::core::window::hann_window;

/// Drum family guessed from an onset's spectrum and decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeatType {
    Kick,
    Snare,
    HiHat,
    Crash,
    Ride,
    Tom,
    Unknown,
}

impl BeatType {
    pub fn name(&self) -> &'static str {
        match self {
            BeatType::Kick => "Kick",
            BeatType::Snare => "Snare",
            BeatType::HiHat => "Hi-Hat",
            BeatType::Crash => "Crash",
            BeatType::Ride => "Ride",
            BeatType::Tom => "Tom",
            BeatType::Unknown => "Unknown",
        }
    }
}

/// One classified onset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub position: usize,
    pub confidence: f32,
    /// Envelope energy in [0, 1].
    pub energy: f32,
    /// Dominant frequency in Hz.
    pub frequency: f32,
    /// Time for the envelope to fall to half its peak, in seconds.
    pub duration: f32,
    pub beat_type: BeatType,
    pub is_accent: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BeatAnalysis {
    pub beats: Vec<BeatMarker>,
    pub analysis_confidence: f32,
    /// Inter-onset intervals vary by more than the configured coefficient of
    /// variation.
    pub has_complex_rhythm: bool,
    pub average_energy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatClassSettings {
    pub min_energy: f32,
    pub fft_size: usize,
    pub accent_threshold: f32,
    pub complex_rhythm_cv: f32,
}

impl Default for BeatClassSettings {
    fn default() -> Self {
        Self {
            min_energy: 0.1,
            fft_size: 2048,
            accent_threshold: 0.8,
            complex_rhythm_cv: 0.25,
        }
    }
}

/// Maps dominant frequency (Hz), energy (0..1) and decay duration (s) to a
/// drum family. Non-positive or non-finite inputs are `Unknown`.
pub fn classify_beat_type(frequency: f32, energy: f32, duration: f32) -> BeatType {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if !(valid(frequency) && valid(energy) && valid(duration)) {
        return BeatType::Unknown;
    }
    match frequency {
        f if f < 150.0 => BeatType::Kick,
        f if f < 400.0 => {
            if duration > 0.2 {
                BeatType::Tom
            } else {
                BeatType::Snare
            }
        }
        f if f < 5000.0 => {
            if energy > 0.7 && duration > 0.3 {
                BeatType::Crash
            } else {
                BeatType::Snare
            }
        }
        _ => {
            if duration >= 0.5 {
                BeatType::Crash
            } else if duration >= 0.15 {
                BeatType::Ride
            } else {
                BeatType::HiHat
            }
        }
    }
}

/// Detects onsets on the mono mix and classifies each one.
pub fn analyze_beats(channels: &[Vec<f32>], sample_rate: u32, settings: &BeatClassSettings) -> BeatAnalysis {
    let mono = mix_to_mono(channels);
    if mono.is_empty() || sample_rate == 0 || settings.fft_size == 0 {
        return BeatAnalysis::default();
    }
    let envelope = energy_envelope(&mono, ENVELOPE_WINDOW);
    let peaks = find_peaks(&envelope, PEAK_RADIUS, settings.min_energy);

    let fft_size = settings.fft_size;
    let window = hann_window(fft_size);
    let mut planner = FftPlanner::new();
    let beats: Vec<BeatMarker> = peaks
        .iter()
        .map(|&peak| {
            let start = peak.saturating_sub(fft_size / 2).min(mono.len().saturating_sub(fft_size));
            let end = (start + fft_size).min(mono.len());
            let mags = magnitude_spectrum(&mut planner, &mono[start..end], &window);
            let frequency = dominant_frequency(&mags, fft_size, sample_rate);
            let energy = envelope[peak];
            let duration = decay_duration(&envelope, peak, sample_rate);
            BeatMarker {
                position: peak,
                confidence: energy.clamp(0.0, 1.0),
                energy,
                frequency,
                duration,
                beat_type: classify_beat_type(frequency, energy, duration),
                is_accent: energy >= settings.accent_threshold,
            }
        })
        .collect();

    if beats.is_empty() {
        return BeatAnalysis::default();
    }
    let count = beats.len() as f32;
    let average_energy = beats.iter().map(|b| b.energy).sum::<f32>() / count;
    let analysis_confidence = beats.iter().map(|b| b.confidence).sum::<f32>() / count;
    let has_complex_rhythm = interval_variation(&peaks).is_some_and(|cv| cv > settings.complex_rhythm_cv);
    log::debug!(
        "beat classification: {} onsets, complex rhythm {}",
        beats.len(),
        has_complex_rhythm
    );

    BeatAnalysis {
        beats,
        analysis_confidence,
        has_complex_rhythm,
        average_energy,
    }
}

fn decay_duration(envelope: &[f32], peak: usize, sample_rate: u32) -> f32 {
    let half = envelope[peak] * 0.5;
    let len = envelope[peak..]
        .iter()
        .position(|&e| e < half)
        .unwrap_or(envelope.len() - peak);
    len as f32 / sample_rate as f32
}

/// Coefficient of variation of the inter-onset intervals; needs at least
/// two intervals.
fn interval_variation(positions: &[usize]) -> Option<f32> {
    if positions.len() < 3 {
        return None;
    }
    let intervals: Vec<f64> = positions.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    Some((variance.sqrt() / mean) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Exponentially decaying sine burst written at `start`.
    fn add_burst(buf: &mut [f32], start: usize, freq: f32, amp: f32, tau_secs: f32, sr: u32) {
        let len = (tau_secs * 6.0 * sr as f32) as usize;
        for i in 0..len.min(buf.len() - start) {
            let t = i as f32 / sr as f32;
            buf[start + i] += amp * (-t / tau_secs).exp() * (2.0 * PI * freq * t).sin();
        }
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify_beat_type(60.0, 0.9, 0.1), BeatType::Kick);
        assert_eq!(classify_beat_type(200.0, 0.5, 0.05), BeatType::Snare);
        assert_eq!(classify_beat_type(200.0, 0.5, 0.3), BeatType::Tom);
        assert_eq!(classify_beat_type(1000.0, 0.5, 0.1), BeatType::Snare);
        assert_eq!(classify_beat_type(1000.0, 0.9, 0.4), BeatType::Crash);
        assert_eq!(classify_beat_type(8000.0, 0.3, 0.05), BeatType::HiHat);
        assert_eq!(classify_beat_type(8000.0, 0.3, 0.2), BeatType::Ride);
        assert_eq!(classify_beat_type(8000.0, 0.3, 0.8), BeatType::Crash);
        assert_eq!(classify_beat_type(0.0, 0.3, 0.1), BeatType::Unknown);
        assert_eq!(classify_beat_type(100.0, f32::NAN, 0.1), BeatType::Unknown);
        assert_eq!(BeatType::HiHat.name(), "Hi-Hat");
    }

    #[test]
    fn test_kick_and_hat_pattern() {
        let sr = 44100;
        let step = sr as usize / 4;
        let mut samples = vec![0.0f32; step * 16 + sr as usize];
        for k in 0..16 {
            if k % 2 == 0 {
                add_burst(&mut samples, 1000 + k * step, 60.0, 1.0, 0.04, sr);
            } else {
                add_burst(&mut samples, 1000 + k * step, 8000.0, 1.0, 0.015, sr);
            }
        }
        let analysis = analyze_beats(&[samples], sr, &BeatClassSettings::default());
        assert_eq!(analysis.beats.len(), 16);
        for (k, beat) in analysis.beats.iter().enumerate() {
            let expected = if k % 2 == 0 { BeatType::Kick } else { BeatType::HiHat };
            assert_eq!(beat.beat_type, expected, "beat {} at {} Hz", k, beat.frequency);
        }
        assert!(analysis.beats.iter().step_by(2).all(|b| b.is_accent));
        assert!(!analysis.has_complex_rhythm);
        assert!(analysis.average_energy > 0.0 && analysis.average_energy <= 1.0);
        assert!(analysis.analysis_confidence > 0.0);
    }

    #[test]
    fn test_irregular_onsets_flag_complex_rhythm() {
        let sr = 44100;
        let mut samples = vec![0.0f32; sr as usize * 4];
        for &start in &[1000, 6000, 30000, 34000, 80000, 90000, 140000] {
            add_burst(&mut samples, start, 60.0, 1.0, 0.02, sr);
        }
        let analysis = analyze_beats(&[samples], sr, &BeatClassSettings::default());
        assert!(analysis.beats.len() >= 5);
        assert!(analysis.has_complex_rhythm);
    }

    #[test]
    fn test_silence_and_empty_input() {
        let settings = BeatClassSettings::default();
        assert!(analyze_beats(&[vec![0.0; 44100]], 44100, &settings).beats.is_empty());
        assert!(analyze_beats(&[], 44100, &settings).beats.is_empty());
        assert!(analyze_beats(&[vec![0.5; 100]], 0, &settings).beats.is_empty());
    }
}
