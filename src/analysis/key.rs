//! Musical key estimation from chroma features.

use std::fmt;

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::core::fft::{bin_frequency, magnitude_spectrum};
use crate::core::window::hann_window;

/// Pitch-class names, C first.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Krumhansl-Kessler major key profile, tonic first.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
/// Krumhansl-Kessler minor key profile, tonic first.
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Lowest frequency folded into the chroma vector.
const CHROMA_MIN_HZ: f32 = 80.0;
/// Highest frequency folded into the chroma vector.
const CHROMA_MAX_HZ: f32 = 5000.0;

/// A major or minor key, identified by its tonic pitch class (0 = C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Major(u8),
    Minor(u8),
}

impl Key {
    /// Tonic pitch class, 0..12.
    #[inline]
    pub fn tonic(&self) -> u8 {
        match self {
            Key::Major(t) | Key::Minor(t) => t % 12,
        }
    }

    #[inline]
    pub fn is_major(&self) -> bool {
        matches!(self, Key::Major(_))
    }

    /// Name such as `"C# Minor"`.
    pub fn name(&self) -> String {
        let mode = if self.is_major() { "Major" } else { "Minor" };
        format!("{} {}", NOTE_NAMES[self.tonic() as usize], mode)
    }

    /// Parses names produced by [`Key::name`].
    pub fn parse(name: &str) -> Option<Key> {
        let (note, mode) = name.trim().split_once(' ')?;
        let tonic = NOTE_NAMES.iter().position(|&n| n == note)? as u8;
        match mode {
            "Major" => Some(Key::Major(tonic)),
            "Minor" => Some(Key::Minor(tonic)),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A key with its profile correlation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key: Key,
    /// Correlation clamped to [0, 1].
    pub confidence: f32,
    /// Raw Pearson correlation with the key profile.
    pub strength: f32,
}

/// A modulation between two analysis segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyChange {
    /// First sample of the segment in the new key.
    pub position: usize,
    pub from: Key,
    pub to: KeyInfo,
}

/// Result of a key analysis. `primary` is `None` for silence or input
/// shorter than one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyAnalysis {
    pub primary: Option<KeyInfo>,
    /// Track-average chroma, normalized to a maximum of 1.
    pub chroma: Vec<f32>,
    pub key_changes: Vec<KeyChange>,
    pub overall_confidence: f32,
}

impl KeyAnalysis {
    #[inline]
    pub fn has_key_change(&self) -> bool {
        !self.key_changes.is_empty()
    }
}

/// Key analysis options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyOptions {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Reference frequency of A4 in Hz.
    pub tuning_frequency: f32,
    pub detect_key_changes: bool,
    /// A segment only counts as modulated when its best key beats the
    /// previous key by more than this correlation margin.
    pub key_change_threshold: f32,
    /// Frames per segment for key change detection.
    pub segment_frames: usize,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 2048,
            tuning_frequency: 440.0,
            detect_key_changes: false,
            key_change_threshold: 0.1,
            segment_frames: 32,
        }
    }
}

impl KeyOptions {
    /// Enable modulation detection.
    pub fn with_key_changes(mut self, detect: bool) -> Self {
        self.detect_key_changes = detect;
        self
    }

    /// Set frames per key-change segment.
    pub fn with_segment_frames(mut self, frames: usize) -> Self {
        self.segment_frames = frames;
        self
    }
}

/// A key estimation strategy.
pub trait KeyEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, samples: &[f32], sample_rate: u32) -> KeyAnalysis;
}

/// Chroma-profile key estimator.
///
/// Hann-windowed FFT frames are folded into 12 pitch classes (energy per
/// class), averaged over the track, and correlated against the 24 rotated
/// major and minor profiles. The best correlation wins; majors are tried
/// before minors at each tonic and ties keep the first.
#[derive(Debug, Clone, Default)]
pub struct ChromaKeyEstimator {
    options: KeyOptions,
}

impl ChromaKeyEstimator {
    pub fn new(options: KeyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &KeyOptions {
        &self.options
    }

    /// Per-frame chroma vectors (not normalized).
    pub fn chroma_frames(&self, samples: &[f32], sample_rate: u32) -> Vec<[f32; 12]> {
        let frame_size = self.options.frame_size;
        let hop = self.options.hop_size.max(1);
        if frame_size == 0 || samples.len() < frame_size || sample_rate == 0 {
            return Vec::new();
        }
        let window = hann_window(frame_size);
        let pitch_classes: Vec<Option<usize>> = (0..=frame_size / 2)
            .map(|bin| {
                let freq = bin_frequency(bin, frame_size, sample_rate);
                (CHROMA_MIN_HZ..=CHROMA_MAX_HZ)
                    .contains(&freq)
                    .then(|| pitch_class(freq, self.options.tuning_frequency))
            })
            .collect();

        let mut planner = FftPlanner::new();
        let mut frames = Vec::with_capacity((samples.len() - frame_size) / hop + 1);
        let mut start = 0;
        while start + frame_size <= samples.len() {
            let mags = magnitude_spectrum(&mut planner, &samples[start..start + frame_size], &window);
            let mut chroma = [0.0f32; 12];
            for (mag, pc) in mags.iter().zip(pitch_classes.iter()) {
                if let Some(pc) = pc {
                    chroma[*pc] += mag * mag;
                }
            }
            frames.push(chroma);
            start += hop;
        }
        frames
    }
}

impl KeyEstimator for ChromaKeyEstimator {
    fn name(&self) -> &'static str {
        "chroma-profile"
    }

    fn estimate(&self, samples: &[f32], sample_rate: u32) -> KeyAnalysis {
        let frames = self.chroma_frames(samples, sample_rate);
        if frames.is_empty() {
            log::debug!("key: no complete frames in {} samples", samples.len());
            return KeyAnalysis::default();
        }

        let chroma = normalize_chroma(&average_chroma(&frames));
        let primary = detect_key_from_chroma(&chroma);
        let mut analysis = KeyAnalysis {
            overall_confidence: primary.map_or(0.0, |k| k.confidence),
            primary,
            chroma: chroma.to_vec(),
            key_changes: Vec::new(),
        };

        if self.options.detect_key_changes && self.options.segment_frames > 0 {
            analysis.key_changes = self.detect_key_changes(&frames);
        }
        if let Some(k) = analysis.primary {
            log::debug!(
                "key: {} (confidence {:.3}, {} changes)",
                k.key,
                k.confidence,
                analysis.key_changes.len()
            );
        }
        analysis
    }
}

impl ChromaKeyEstimator {
    fn detect_key_changes(&self, frames: &[[f32; 12]]) -> Vec<KeyChange> {
        let seg = self.options.segment_frames;
        let mut changes = Vec::new();
        let mut previous: Option<Key> = None;
        for (index, segment) in frames.chunks(seg).enumerate() {
            let chroma = normalize_chroma(&average_chroma(segment));
            let Some(current) = detect_key_from_chroma(&chroma) else {
                continue;
            };
            if let Some(prev) = previous {
                if current.key != prev {
                    let margin = current.strength - key_correlation(&chroma, prev);
                    if margin > self.options.key_change_threshold {
                        changes.push(KeyChange {
                            position: index * seg * self.options.hop_size,
                            from: prev,
                            to: current,
                        });
                        previous = Some(current.key);
                    }
                    continue;
                }
            }
            previous = Some(current.key);
        }
        changes
    }
}

/// Estimates the key of a mono signal.
pub fn analyze_key(samples: &[f32], sample_rate: u32, options: &KeyOptions) -> KeyAnalysis {
    ChromaKeyEstimator::new(options.clone()).estimate(samples, sample_rate)
}

/// Best-correlated key for a 12-bin chroma vector, or `None` when the
/// vector is flat (silence).
pub fn detect_key_from_chroma(chroma: &[f32; 12]) -> Option<KeyInfo> {
    let mut best: Option<KeyInfo> = None;
    for tonic in 0..12u8 {
        for key in [Key::Major(tonic), Key::Minor(tonic)] {
            let strength = key_correlation(chroma, key);
            if best.map_or(true, |b| strength > b.strength) {
                best = Some(KeyInfo {
                    key,
                    confidence: strength.clamp(0.0, 1.0),
                    strength,
                });
            }
        }
    }
    best.filter(|b| b.strength.is_finite() && b.strength > 0.0)
}

/// Pearson correlation between a chroma vector and a key's rotated profile.
pub fn key_correlation(chroma: &[f32; 12], key: Key) -> f32 {
    let profile = if key.is_major() {
        &MAJOR_PROFILE
    } else {
        &MINOR_PROFILE
    };
    let tonic = key.tonic() as usize;
    let rotated: Vec<f32> = (0..12).map(|i| chroma[(i + tonic) % 12]).collect();
    pearson(&rotated, profile)
}

fn pearson(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len()) as f32;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0f32, 0.0f32, 0.0f32);
    for (&x, &y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-12 {
        return 0.0;
    }
    cov / denom
}

/// Pitch class (0 = C) of a frequency for a given A4 tuning.
#[inline]
pub fn pitch_class(freq: f32, tuning: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / tuning).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

fn average_chroma(frames: &[[f32; 12]]) -> [f32; 12] {
    let mut avg = [0.0f32; 12];
    if frames.is_empty() {
        return avg;
    }
    for frame in frames {
        for (a, &v) in avg.iter_mut().zip(frame.iter()) {
            *a += v;
        }
    }
    for a in avg.iter_mut() {
        *a /= frames.len() as f32;
    }
    avg
}

fn normalize_chroma(chroma: &[f32; 12]) -> [f32; 12] {
    let max = chroma.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return *chroma;
    }
    chroma.map(|v| v / max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Sum of sines at MIDI notes with per-note amplitudes.
    fn chord(notes: &[(i32, f32)], sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                notes
                    .iter()
                    .map(|&(midi, amp)| {
                        let f = 440.0 * 2f32.powf((midi - 69) as f32 / 12.0);
                        amp * (2.0 * PI * f * t).sin()
                    })
                    .sum::<f32>()
                    * 0.1
            })
            .collect()
    }

    #[test]
    fn test_key_names_round_trip() {
        assert_eq!(Key::Major(0).name(), "C Major");
        assert_eq!(Key::Minor(9).name(), "A Minor");
        assert_eq!(Key::Minor(1).to_string(), "C# Minor");
        assert_eq!(Key::parse("F# Major"), Some(Key::Major(6)));
        assert_eq!(Key::parse("A Minor"), Some(Key::Minor(9)));
        assert_eq!(Key::parse("H Major"), None);
        assert_eq!(Key::parse("Unknown"), None);
        assert!(Key::Major(3).is_major());
        assert!(!Key::Minor(3).is_major());
    }

    #[test]
    fn test_pitch_class() {
        assert_eq!(pitch_class(440.0, 440.0), 9);
        assert_eq!(pitch_class(261.63, 440.0), 0);
        assert_eq!(pitch_class(523.25, 440.0), 0);
        assert_eq!(pitch_class(392.0, 440.0), 7);
    }

    #[test]
    fn test_detect_c_major_from_chroma() {
        // C major scale with tonic and dominant emphasized
        let chroma = [1.0, 0.0, 0.5, 0.0, 0.5, 0.5, 0.0, 1.0, 0.0, 0.5, 0.0, 0.5];
        let info = detect_key_from_chroma(&chroma).unwrap();
        assert_eq!(info.key, Key::Major(0));
        assert!(info.confidence > 0.5);
    }

    #[test]
    fn test_detect_a_minor_from_chroma() {
        let chroma = [0.5, 0.0, 0.5, 0.0, 1.0, 0.5, 0.0, 0.5, 0.0, 1.0, 0.0, 0.5];
        let info = detect_key_from_chroma(&chroma).unwrap();
        assert_eq!(info.key, Key::Minor(9));
    }

    #[test]
    fn test_flat_chroma_has_no_key() {
        assert!(detect_key_from_chroma(&[0.0; 12]).is_none());
        assert!(detect_key_from_chroma(&[1.0; 12]).is_none());
    }

    #[test]
    fn test_estimate_c_major_audio() {
        let sr = 44100;
        // C5 D5 E5 F5 G5 A5 B5 with C and G louder
        let notes = [(72, 1.0), (74, 0.7), (76, 0.7), (77, 0.7), (79, 1.0), (81, 0.7), (83, 0.7)];
        let samples = chord(&notes, sr, sr as usize * 2);
        let analysis = analyze_key(&samples, sr, &KeyOptions::default());
        let primary = analysis.primary.unwrap();
        assert_eq!(primary.key, Key::Major(0), "got {}", primary.key);
        assert_eq!(analysis.chroma.len(), 12);
        assert!(!analysis.has_key_change());
    }

    #[test]
    fn test_estimate_detects_modulation() {
        let sr = 44100;
        let c_major = [(72, 1.0), (74, 0.7), (76, 0.7), (77, 0.7), (79, 1.0), (81, 0.7), (83, 0.7)];
        // F# major: F# G# A# B C# D# F with F# and C# louder
        let f_sharp = [(78, 1.0), (80, 0.7), (82, 0.7), (83, 0.7), (85, 1.0), (87, 0.7), (89, 0.7)];
        let mut samples = chord(&c_major, sr, sr as usize * 3);
        samples.extend(chord(&f_sharp, sr, sr as usize * 3));

        let options = KeyOptions::default().with_key_changes(true).with_segment_frames(16);
        let analysis = ChromaKeyEstimator::new(options).estimate(&samples, sr);
        assert!(analysis.has_key_change());
        let first = &analysis.key_changes[0];
        assert_eq!(first.from, Key::Major(0));
        assert_eq!(first.to.key, Key::Major(6));
    }

    #[test]
    fn test_estimate_short_or_silent_input() {
        let estimator = ChromaKeyEstimator::default();
        assert_eq!(estimator.name(), "chroma-profile");
        assert!(estimator.estimate(&[0.1; 100], 44100).primary.is_none());
        assert!(estimator.estimate(&vec![0.0; 44100], 44100).primary.is_none());
    }
}
