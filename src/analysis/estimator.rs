//! Swappable tempo estimation strategies.

use crate::analysis::bpm::{
    correct_to_standard_bpm, estimate_average_interval, fold_bpm_into_range, place_beats,
    AnalysisOptions, AnalysisResult, BeatInfo,
};
use crate::analysis::envelope::{energy_envelope, find_peaks, ENVELOPE_WINDOW, PEAK_RADIUS};

/// Threshold step of the extra peak-picking passes.
const THRESHOLD_STEP: f32 = 0.05;
/// Number of extra passes (0.05 through 0.30).
const THRESHOLD_PASSES: usize = 6;
/// Extra passes with fewer peaks than this are ignored.
const MIN_PEAKS_PER_PASS: usize = 10;
/// Window length of the drifting-tempo scan, in seconds. Windows overlap by half.
const TEMPO_WINDOW_SECS: usize = 10;
/// Peak threshold inside each scan window.
const WINDOW_THRESHOLD: f32 = 0.1;
/// Scan windows with fewer peaks than this are ignored.
const MIN_PEAKS_PER_WINDOW: usize = 5;
/// Candidates closer than this many BPM vote for the same tempo.
const CLUSTER_WIDTH_BPM: f64 = 5.0;
/// The consensus tempo replaces the most confident one only beyond this distance.
const CONSENSUS_OVERRIDE_BPM: f64 = 10.0;

/// Detection-function hop of the onset-flux estimator, in seconds.
const FLUX_STEP_SECS: f32 = 0.01161;
/// Detection-function window is the next power of two above `sr / this`.
const FLUX_MAX_BIN_HZ: u32 = 50;
/// Flux peaks must exceed this multiple of the mean flux.
const FLUX_PEAK_RATIO: f64 = 1.5;
/// Minimum spacing between flux beats, in milliseconds.
const FLUX_MIN_BEAT_MS: u32 = 100;
/// Harmonic scoring looks at no more than this many beats.
const FLUX_SCORED_BEATS: usize = 512;
/// Tempo multiples tried during harmonic selection.
const FLUX_HARMONICS: [f64; 5] = [1.0, 2.0, 4.0, 0.5, 0.25];

/// A tempo estimation strategy.
///
/// Implementations fill the same [`AnalysisResult`] contract; they are not
/// expected to agree with each other on every input.
pub trait TempoEstimator: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Estimates tempo and beats from mono samples.
    fn estimate(&self, samples: &[f32], sample_rate: u32, options: &AnalysisOptions)
        -> AnalysisResult;
}

/// Default estimator: energy-envelope peaks, interval histogram, octave
/// folding, then beat placement on the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyPeakEstimator;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoCandidate {
    bpm: f64,
    confidence: f32,
    threshold: f32,
}

impl EnergyPeakEstimator {
    fn candidate(
        envelope: &[f32],
        sample_rate: u32,
        threshold: f32,
        min_peaks: usize,
        assume_fixed_tempo: bool,
        options: &AnalysisOptions,
    ) -> Option<TempoCandidate> {
        let peaks = find_peaks(envelope, PEAK_RADIUS, threshold);
        if peaks.len() < min_peaks.max(2) {
            log::debug!("bpm: {} peaks above {:.2}, skipping", peaks.len(), threshold);
            return None;
        }
        let (interval, confidence) = estimate_average_interval(&peaks, assume_fixed_tempo)?;
        if interval <= 0.0 {
            return None;
        }
        let raw = 60.0 * sample_rate as f64 / interval;
        let Some(bpm) = fold_bpm_into_range(raw, options.min_bpm, options.max_bpm) else {
            log::debug!(
                "bpm: {:.2} from {} peaks above {:.2} is outside {}..={}",
                raw,
                peaks.len(),
                threshold,
                options.min_bpm,
                options.max_bpm
            );
            return None;
        };
        log::debug!(
            "bpm: candidate {:.2} (confidence {:.3}, {} peaks above {:.2})",
            bpm,
            confidence,
            peaks.len(),
            threshold
        );
        Some(TempoCandidate {
            bpm,
            confidence,
            threshold,
        })
    }

    /// Median-interval candidates from overlapping windows, for material
    /// whose tempo drifts. Each window's envelope is normalized on its own.
    fn windowed_candidates(samples: &[f32], sample_rate: u32, options: &AnalysisOptions) -> Vec<TempoCandidate> {
        let window = sample_rate as usize * TEMPO_WINDOW_SECS;
        let hop = (window / 2).max(1);
        let mut candidates = Vec::new();
        let mut start = 0;
        while start + window < samples.len() {
            let envelope = energy_envelope(&samples[start..start + window], ENVELOPE_WINDOW);
            if let Some(candidate) = Self::candidate(
                &envelope,
                sample_rate,
                WINDOW_THRESHOLD,
                MIN_PEAKS_PER_WINDOW,
                false,
                options,
            ) {
                log::debug!(
                    "bpm: window at {:.1}s suggests {:.2}",
                    start as f64 / sample_rate as f64,
                    candidate.bpm
                );
                candidates.push(candidate);
            }
            start += hop;
        }
        candidates
    }
}

/// Picks the most confident candidate (earliest on ties), then lets the
/// largest cluster of agreeing candidates override it when the two are far
/// apart. Tempos are snapped before comparison when `snap` is set.
fn select_tempo(candidates: &[TempoCandidate], snap: bool) -> Option<TempoCandidate> {
    let mut best = *candidates.first()?;
    for candidate in &candidates[1..] {
        if candidate.confidence > best.confidence {
            best = *candidate;
        }
    }
    let normalize = |bpm: f64| if snap { correct_to_standard_bpm(bpm) } else { bpm };

    // (running mean, members), first cluster within range takes the vote
    let mut clusters: Vec<(f64, usize)> = Vec::new();
    for candidate in candidates {
        match clusters
            .iter_mut()
            .find(|(mean, _)| (*mean - candidate.bpm).abs() < CLUSTER_WIDTH_BPM)
        {
            Some((mean, count)) => {
                *mean = (*mean * *count as f64 + candidate.bpm) / (*count + 1) as f64;
                *count += 1;
            }
            None => clusters.push((candidate.bpm, 1)),
        }
    }
    let mut consensus = clusters[0];
    for &cluster in &clusters[1..] {
        if cluster.1 > consensus.1 {
            consensus = cluster;
        }
    }

    let consensus_bpm = normalize(consensus.0);
    if consensus.1 > 1 && (consensus_bpm - normalize(best.bpm)).abs() > CONSENSUS_OVERRIDE_BPM {
        log::debug!(
            "bpm: {} candidates agree on {:.2}, overriding {:.2}",
            consensus.1,
            consensus_bpm,
            best.bpm
        );
        best.bpm = consensus_bpm;
    }
    Some(best)
}

impl TempoEstimator for EnergyPeakEstimator {
    fn name(&self) -> &'static str {
        "energy-peak"
    }

    fn estimate(
        &self,
        samples: &[f32],
        sample_rate: u32,
        options: &AnalysisOptions,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::empty(sample_rate);
        if samples.is_empty() || sample_rate == 0 {
            return result;
        }
        let envelope = energy_envelope(samples, ENVELOPE_WINDOW);

        let mut candidates: Vec<TempoCandidate> = Self::candidate(
            &envelope,
            sample_rate,
            options.min_energy,
            2,
            options.assume_fixed_tempo,
            options,
        )
        .into_iter()
        .collect();
        if !options.fast_analysis {
            for pass in 1..=THRESHOLD_PASSES {
                let threshold = pass as f32 * THRESHOLD_STEP;
                if (threshold - options.min_energy).abs() < 1e-6 {
                    continue;
                }
                candidates.extend(Self::candidate(
                    &envelope,
                    sample_rate,
                    threshold,
                    MIN_PEAKS_PER_PASS,
                    options.assume_fixed_tempo,
                    options,
                ));
            }
        }
        if !options.assume_fixed_tempo {
            candidates.extend(Self::windowed_candidates(samples, sample_rate, options));
        }

        let Some(chosen) = select_tempo(&candidates, options.snap_to_standard_bpm) else {
            return result;
        };
        log::debug!(
            "bpm: chose {:.2} from threshold {:.2} among {} candidates",
            chosen.bpm,
            chosen.threshold,
            candidates.len()
        );

        result.bpm = chosen.bpm;
        result.confidence = chosen.confidence;
        result.beats = place_beats(
            &envelope,
            60.0 * sample_rate as f64 / chosen.bpm,
            options.tolerance_percent,
        );
        result.update_regularity(options.tolerance_percent);
        result
    }
}

/// Alternate estimator built on an RMS onset-flux detection function.
///
/// Beats are flux peaks rather than grid placements. The raw tempo from the
/// mean beat interval is reported as `preliminary_bpm`; the final tempo is
/// the harmonic (×1, ×2, ×4, ×½, ×¼, folded into range) whose grid best fits
/// the detected beats. Beat deviations are measured against that grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnsetFluxEstimator;

impl OnsetFluxEstimator {
    /// Positive RMS flux per hop. Returns the function and the hop size.
    fn detection_function(samples: &[f32], sample_rate: u32) -> (Vec<f64>, usize) {
        let step = ((sample_rate as f32 * FLUX_STEP_SECS) as usize).max(1);
        let window = ((sample_rate / FLUX_MAX_BIN_HZ) as usize).max(1).next_power_of_two();
        if samples.len() <= window {
            return (Vec::new(), step);
        }

        let levels: Vec<f64> = (0..samples.len() - window)
            .step_by(step)
            .map(|start| {
                let sum_sq: f64 = samples[start..start + window]
                    .iter()
                    .map(|&s| (s as f64) * (s as f64))
                    .sum();
                (sum_sq / window as f64).sqrt()
            })
            .collect();

        let mut flux = vec![0.0f64; levels.len()];
        for i in 1..levels.len() {
            flux[i] = (levels[i] - levels[i - 1]).max(0.0);
        }
        (flux, step)
    }

    fn track_beats(flux: &[f64], sample_rate: u32, step: usize) -> Vec<BeatInfo> {
        if flux.len() < 3 {
            return Vec::new();
        }
        let mean = flux.iter().sum::<f64>() / flux.len() as f64;
        let threshold = mean * FLUX_PEAK_RATIO;
        let max = flux.iter().cloned().fold(0.0f64, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let min_spacing = (sample_rate * FLUX_MIN_BEAT_MS / 1000) as usize;
        let mut beats: Vec<BeatInfo> = Vec::new();
        for i in 1..flux.len() - 1 {
            if flux[i] > threshold && flux[i] > flux[i - 1] && flux[i] > flux[i + 1] {
                let position = i * step + step / 2;
                if beats
                    .last()
                    .is_some_and(|last| position - last.position < min_spacing)
                {
                    continue;
                }
                beats.push(BeatInfo {
                    position,
                    expected_position: position,
                    confidence: (flux[i] / max) as f32,
                    deviation: 0.0,
                    energy: flux[i] as f32,
                });
            }
        }
        beats
    }

    /// Weighted phase error of the beats against a grid at `bpm`.
    fn grid_score(beats: &[BeatInfo], grid_start: usize, sample_rate: u32, bpm: f64) -> f64 {
        if bpm <= 0.0 {
            return f64::INFINITY;
        }
        let interval = 60.0 * sample_rate as f64 / bpm;
        let scored = &beats[..beats.len().min(FLUX_SCORED_BEATS)];
        let (total, max) = scored.iter().fold((0.0f64, 0.0f64), |(sum, max), b| {
            let phase = (b.position as f64 - grid_start as f64) / interval;
            let dev = (phase - phase.round()).abs();
            (sum + dev, max.max(dev))
        });
        let avg = total / scored.len().max(1) as f64;
        avg * 0.7 + max * 0.3
    }
}

impl TempoEstimator for OnsetFluxEstimator {
    fn name(&self) -> &'static str {
        "onset-flux"
    }

    fn estimate(
        &self,
        samples: &[f32],
        sample_rate: u32,
        options: &AnalysisOptions,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::empty(sample_rate);
        if samples.is_empty() || sample_rate == 0 {
            return result;
        }
        let (flux, step) = Self::detection_function(samples, sample_rate);
        let mut beats = Self::track_beats(&flux, sample_rate, step);
        if beats.len() < 2 {
            log::debug!("bpm: onset flux found {} beats", beats.len());
            return result;
        }

        let grid_start = beats[0].position;
        let span = (beats[beats.len() - 1].position - grid_start) as f64;
        let mean_interval = span / (beats.len() - 1) as f64;
        let base_bpm = 60.0 * sample_rate as f64 / mean_interval;

        let mut best_bpm = base_bpm;
        let mut best_score = f64::INFINITY;
        for &multiple in &FLUX_HARMONICS {
            let mut candidate = base_bpm * multiple;
            while candidate < options.min_bpm {
                candidate *= 2.0;
            }
            while candidate > options.max_bpm {
                candidate *= 0.5;
            }
            let score = Self::grid_score(&beats, grid_start, sample_rate, candidate);
            log::debug!("bpm: harmonic {:.2} scores {:.4}", candidate, score);
            if score < best_score {
                best_score = score;
                best_bpm = candidate;
            }
        }

        let interval = 60.0 * sample_rate as f64 / best_bpm;
        for beat in &mut beats {
            let phase = (beat.position as f64 - grid_start as f64) / interval;
            let nearest = phase.round();
            beat.expected_position = (grid_start as f64 + nearest * interval).round().max(0.0) as usize;
            beat.deviation = (phase - nearest) as f32;
        }

        result.bpm = best_bpm;
        result.preliminary_bpm = Some(base_bpm);
        result.beats = beats;
        result.update_regularity(options.tolerance_percent);
        result.confidence = 1.0 - result.average_deviation.min(1.0);
        result
    }
}
