//! Waveform summaries and simple spectral descriptors for display.

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::core::fft::{bin_frequency, magnitude_spectrum};
use crate::core::types::rms;
use crate::core::window::hann_window;

/// Frequency bands in Hz: sub-bass, bass, low mids, mids, upper mids,
/// presence, brilliance.
pub const FREQUENCY_BANDS: [(f32, f32); 7] = [
    (20.0, 60.0),
    (60.0, 250.0),
    (250.0, 500.0),
    (500.0, 2000.0),
    (2000.0, 4000.0),
    (4000.0, 6000.0),
    (6000.0, 20000.0),
];

/// Window length for the RMS and zero-crossing series.
pub const DEFAULT_ANALYSIS_WINDOW: usize = 1024;

/// Basic stereo waveform facts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveformData {
    /// Average of both channels over the shorter length.
    pub mono: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: i64,
    pub max_amplitude: f32,
    pub rms_level: f32,
}

/// Display-oriented summary derived from [`WaveformData`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveformOverview {
    /// `(min, max)` per bucket, `resolution` buckets at most.
    pub peaks: Vec<(f32, f32)>,
    pub rms: Vec<f32>,
    pub frequency_bands: Vec<f32>,
    pub spectral_centroid: Vec<f32>,
    pub zero_crossing_rate: Vec<f32>,
}

/// Options for [`generate_overview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformOptions {
    /// Number of peak buckets.
    pub resolution: usize,
    pub analyze_frequency_bands: bool,
    pub calculate_spectral_features: bool,
    pub fft_size: usize,
    pub window_size: usize,
}

impl Default for WaveformOptions {
    fn default() -> Self {
        Self {
            resolution: 1024,
            analyze_frequency_bands: true,
            calculate_spectral_features: true,
            fft_size: 1024,
            window_size: DEFAULT_ANALYSIS_WINDOW,
        }
    }
}

/// Mixes a stereo pair to mono and measures duration, peak and RMS.
pub fn analyze_waveform(left: &[f32], right: &[f32], sample_rate: u32) -> WaveformData {
    let mono: Vec<f32> = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| (l + r) * 0.5)
        .collect();
    let duration_ms = if sample_rate == 0 {
        0
    } else {
        (mono.len() as i64 * 1000) / sample_rate as i64
    };
    let max_amplitude = mono.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    WaveformData {
        rms_level: rms(&mono),
        mono,
        sample_rate,
        duration_ms,
        max_amplitude,
    }
}

/// Builds the display summary. Disabled features stay empty.
pub fn generate_overview(data: &WaveformData, options: &WaveformOptions) -> WaveformOverview {
    if data.mono.is_empty() {
        return WaveformOverview::default();
    }
    let mut overview = WaveformOverview {
        peaks: calculate_peaks(&data.mono, options.resolution),
        rms: calculate_rms(&data.mono, options.window_size),
        ..Default::default()
    };
    if options.analyze_frequency_bands {
        overview.frequency_bands =
            calculate_frequency_bands(&data.mono, data.sample_rate, options.fft_size);
    }
    if options.calculate_spectral_features {
        overview.spectral_centroid =
            calculate_spectral_centroid(&data.mono, data.sample_rate, options.fft_size);
        overview.zero_crossing_rate = calculate_zero_crossing_rate(&data.mono, options.window_size);
    }
    log::debug!(
        "waveform overview: {} peaks, {} rms windows",
        overview.peaks.len(),
        overview.rms.len()
    );
    overview
}

/// RMS of each complete window. A trailing partial window is dropped.
pub fn calculate_rms(samples: &[f32], window_size: usize) -> Vec<f32> {
    if window_size == 0 {
        return Vec::new();
    }
    samples.chunks_exact(window_size).map(rms).collect()
}

/// Minimum and maximum sample of each bucket. Short input yields one
/// bucket per sample.
pub fn calculate_peaks(samples: &[f32], resolution: usize) -> Vec<(f32, f32)> {
    if samples.is_empty() || resolution == 0 {
        return Vec::new();
    }
    let buckets = resolution.min(samples.len());
    (0..buckets)
        .map(|b| {
            let start = b * samples.len() / buckets;
            let end = ((b + 1) * samples.len() / buckets).max(start + 1);
            samples[start..end]
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)))
        })
        .collect()
}

/// Summed magnitude per [`FREQUENCY_BANDS`] entry, averaged over
/// consecutive `fft_size` frames (the last one zero-padded).
pub fn calculate_frequency_bands(samples: &[f32], sample_rate: u32, fft_size: usize) -> Vec<f32> {
    let mut bands = vec![0.0f32; FREQUENCY_BANDS.len()];
    if samples.is_empty() || sample_rate == 0 || fft_size == 0 {
        return bands;
    }
    let window = hann_window(fft_size);
    let mut planner = FftPlanner::new();
    let mut spectrum = vec![0.0f32; fft_size / 2 + 1];
    let mut frames = 0usize;
    for frame in samples.chunks(fft_size) {
        let mags = magnitude_spectrum(&mut planner, frame, &window);
        for (acc, m) in spectrum.iter_mut().zip(mags) {
            *acc += m;
        }
        frames += 1;
    }
    let last_bin = spectrum.len() - 1;
    for (band, &(low, high)) in bands.iter_mut().zip(FREQUENCY_BANDS.iter()) {
        let low_bin = ((low * fft_size as f32) / sample_rate as f32) as usize;
        let high_bin = ((high * fft_size as f32) / sample_rate as f32) as usize;
        let (low_bin, high_bin) = (low_bin.min(last_bin), high_bin.min(last_bin));
        *band = spectrum[low_bin..=high_bin].iter().sum::<f32>() / frames as f32;
    }
    bands
}

/// Spectral centroid in Hz per frame, hop `fft_size / 2`.
pub fn calculate_spectral_centroid(samples: &[f32], sample_rate: u32, fft_size: usize) -> Vec<f32> {
    if samples.len() < fft_size || sample_rate == 0 || fft_size < 2 {
        return Vec::new();
    }
    let hop = fft_size / 2;
    let window = hann_window(fft_size);
    let mut planner = FftPlanner::new();
    let frames = (samples.len() - fft_size) / hop + 1;
    (0..frames)
        .map(|i| {
            let start = i * hop;
            let mags = magnitude_spectrum(&mut planner, &samples[start..start + fft_size], &window);
            let (weighted, total) = mags.iter().enumerate().fold((0.0f32, 0.0f32), |(w, t), (bin, &m)| {
                (w + bin_frequency(bin, fft_size, sample_rate) * m, t + m)
            });
            if total > 0.0 {
                weighted / total
            } else {
                0.0
            }
        })
        .collect()
}

/// Fraction of adjacent sample pairs that change sign, per complete window.
pub fn calculate_zero_crossing_rate(samples: &[f32], window_size: usize) -> Vec<f32> {
    if window_size < 2 {
        return Vec::new();
    }
    samples
        .chunks_exact(window_size)
        .map(|w| {
            let crossings = w.windows(2).filter(|p| (p[0] >= 0.0) != (p[1] >= 0.0)).count();
            crossings as f32 / (window_size - 1) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_analyze_waveform_mixes_to_shorter_channel() {
        let left = vec![1.0; 48000];
        let right = vec![0.0; 44100];
        let data = analyze_waveform(&left, &right, 44100);
        assert_eq!(data.mono.len(), 44100);
        assert_eq!(data.duration_ms, 1000);
        assert!((data.max_amplitude - 0.5).abs() < 1e-6);
        assert!((data.rms_level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_rate_gives_zero_duration() {
        let data = analyze_waveform(&[0.5; 10], &[0.5; 10], 0);
        assert_eq!(data.duration_ms, 0);
    }

    #[test]
    fn test_rms_windows() {
        let samples = vec![0.5f32; 2500];
        let values = calculate_rms(&samples, 1024);
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-6));
        assert!(calculate_rms(&samples, 0).is_empty());
    }

    #[test]
    fn test_peaks_per_bucket() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.8 } else { -0.4 }).collect();
        let peaks = calculate_peaks(&samples, 10);
        assert_eq!(peaks.len(), 10);
        for (lo, hi) in peaks {
            assert_eq!(lo, -0.4);
            assert_eq!(hi, 0.8);
        }
        assert_eq!(calculate_peaks(&[0.1, 0.2], 10).len(), 2);
        assert!(calculate_peaks(&[], 10).is_empty());
    }

    #[test]
    fn test_frequency_bands_locate_tone() {
        let sr = 44100;
        let bands = calculate_frequency_bands(&sine(1000.0, sr, 8192), sr, 1024);
        assert_eq!(bands.len(), 7);
        let loudest = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 3, "1 kHz belongs to the 500-2000 Hz band: {:?}", bands);
    }

    #[test]
    fn test_spectral_centroid_tracks_frequency() {
        let sr = 44100;
        let low = calculate_spectral_centroid(&sine(500.0, sr, 4096), sr, 1024);
        let high = calculate_spectral_centroid(&sine(5000.0, sr, 4096), sr, 1024);
        assert_eq!(low.len(), 7);
        assert!((low[0] - 500.0).abs() < 100.0, "centroid {}", low[0]);
        assert!(high[0] > low[0] * 5.0);
        assert!(calculate_spectral_centroid(&[0.0; 100], sr, 1024).is_empty());
    }

    #[test]
    fn test_zero_crossing_rate() {
        let alternating: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = calculate_zero_crossing_rate(&alternating, 1024);
        assert_eq!(zcr, vec![1.0]);
        assert_eq!(calculate_zero_crossing_rate(&[0.5; 1024], 1024), vec![0.0]);
    }

    #[test]
    fn test_overview_respects_options() {
        let sr = 44100;
        let tone = sine(440.0, sr, sr as usize);
        let data = analyze_waveform(&tone, &tone, sr);
        let options = WaveformOptions {
            analyze_frequency_bands: false,
            ..Default::default()
        };
        let overview = generate_overview(&data, &options);
        assert_eq!(overview.peaks.len(), 1024);
        assert_eq!(overview.rms.len(), sr as usize / 1024);
        assert!(overview.frequency_bands.is_empty());
        assert!(!overview.spectral_centroid.is_empty());
        assert!(!overview.zero_crossing_rate.is_empty());

        assert_eq!(generate_overview(&WaveformData::default(), &options), WaveformOverview::default());
    }
}
