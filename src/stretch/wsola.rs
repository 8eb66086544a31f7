//! WSOLA (Waveform Similarity Overlap-Add) time stretching.

use crate::core::window::hann_window;
use crate::stretch::params::WsolaConfig;
use rustfft::{num_complex::Complex, FftPlanner};

/// Reference energy below which every candidate scores the same.
const ENERGY_EPSILON: f64 = 1e-12;
/// Minimum number of candidates to justify FFT-based correlation over direct computation.
const FFT_CANDIDATE_THRESHOLD: usize = 64;
/// Minimum overlap length for FFT-based correlation to be worthwhile.
const FFT_OVERLAP_THRESHOLD: usize = 32;
/// Output samples whose accumulated window weight is below this are left at zero.
const WINDOW_SUM_EPSILON: f32 = 1e-4;

/// WSOLA (Waveform Similarity Overlap-Add) time stretching.
///
/// Hann-windowed frames are read from the input every `analysis_hop` samples
/// and written to the output every `round(analysis_hop * factor)` samples.
/// Each frame's read position is nudged within the search radius so its start
/// lines up best with what the previous frames already wrote, which keeps the
/// waveform continuous and the pitch unchanged.
pub struct Wsola {
    config: WsolaConfig,
    window: Vec<f32>,
    planner: FftPlanner<f32>,
}

impl std::fmt::Debug for Wsola {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wsola")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Wsola {
    /// Creates a new WSOLA processor.
    pub fn new(config: WsolaConfig) -> Self {
        let window = hann_window(config.window_size);
        Self {
            config,
            window,
            planner: FftPlanner::new(),
        }
    }

    /// Returns the frame layout.
    #[inline]
    pub fn config(&self) -> &WsolaConfig {
        &self.config
    }

    /// Returns true when `len` samples at `factor` can go through WSOLA with
    /// the configured layout.
    pub fn supports(&self, len: usize, factor: f32) -> bool {
        if !factor.is_finite() || factor <= 0.0 || len < self.config.min_input_len() {
            return false;
        }
        if self.config.synthesis_hop(factor) < 1 {
            return false;
        }
        matches!(self.config.overlap(factor), Some(o) if o >= self.config.min_overlap)
    }

    /// Stretches a mono signal to `round(len * factor)` samples.
    ///
    /// Returns `None` when [`supports`](Self::supports) is false; callers
    /// fall back to interpolation in that case. No gain correction is applied.
    pub fn process(&mut self, input: &[f32], factor: f32) -> Option<Vec<f32>> {
        if !self.supports(input.len(), factor) {
            return None;
        }

        let window_size = self.config.window_size;
        let analysis_hop = self.config.analysis_hop;
        let synthesis_hop = self.config.synthesis_hop(factor);
        let overlap = self.config.overlap(factor)?;

        let target_len = (input.len() as f64 * factor as f64).round() as usize;
        let buffer_len = target_len + window_size;
        let mut output = vec![0.0f32; buffer_len];
        let mut window_sum = vec![0.0f32; buffer_len];

        self.overlap_add(input, 0, &mut output, &mut window_sum, 0);

        // Frames may only read complete windows. The last one is pinned so
        // input `len - window..len` ends exactly at `target_len`.
        let last_start = input.len() - window_size;
        let final_out = target_len.saturating_sub(window_size);
        let mut last_written = 0usize;
        let mut nominal = analysis_hop;
        let mut out_pos = synthesis_hop;
        let mut frames = 1usize;
        while nominal <= last_start && out_pos < final_out {
            let best = self.find_best_position(input, &output, &window_sum, nominal, out_pos, overlap);
            self.overlap_add(input, best, &mut output, &mut window_sum, out_pos);
            last_written = out_pos;
            nominal += analysis_hop;
            out_pos += synthesis_hop;
            frames += 1;
        }

        // Output still uncovered before the closing frame is read with the
        // closing frame's alignment so the two agree on where input lands.
        while out_pos < final_out {
            let mapped = last_start.saturating_sub(final_out - out_pos);
            let best = self.find_best_position(input, &output, &window_sum, mapped, out_pos, overlap);
            self.overlap_add(input, best, &mut output, &mut window_sum, out_pos);
            last_written = out_pos;
            out_pos += synthesis_hop;
            frames += 1;
        }

        if final_out > last_written {
            self.overlap_add(input, last_start, &mut output, &mut window_sum, final_out);
            frames += 1;
        }

        for (sample, &weight) in output.iter_mut().zip(window_sum.iter()) {
            if weight > WINDOW_SUM_EPSILON {
                *sample /= weight;
            }
        }

        output.resize(target_len, 0.0);
        log::debug!(
            "wsola: {} -> {} samples in {} frames (factor {:.4}, overlap {})",
            input.len(),
            target_len,
            frames,
            factor,
            overlap
        );
        Some(output)
    }

    /// Picks the input frame start within the search radius whose windowed
    /// head best matches the normalized output already written at `out_pos`.
    ///
    /// Candidates are clamped to `[0, len - window]`. On ties the nominal
    /// position wins.
    fn find_best_position(
        &mut self,
        input: &[f32],
        output: &[f32],
        window_sum: &[f32],
        nominal: usize,
        out_pos: usize,
        overlap: usize,
    ) -> usize {
        let last_start = input.len() - self.config.window_size;
        let radius = self.config.search_radius;
        let nominal = nominal.min(last_start);
        let search_start = nominal.saturating_sub(radius);
        let search_end = (nominal + radius).min(last_start);

        // Already-written output, normalized, with the window folded in so a
        // plain dot product against raw input equals the windowed correlation.
        let reference: Vec<f32> = (0..overlap)
            .map(|i| {
                let weight = window_sum[out_pos + i];
                let value = if weight > WINDOW_SUM_EPSILON {
                    output[out_pos + i] / weight
                } else {
                    0.0
                };
                value * self.window[i]
            })
            .collect();

        let ref_energy: f64 = reference.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if ref_energy < ENERGY_EPSILON || search_start >= search_end {
            return nominal;
        }

        let num_candidates = search_end - search_start + 1;
        let scores = if num_candidates > FFT_CANDIDATE_THRESHOLD && overlap >= FFT_OVERLAP_THRESHOLD
        {
            let search_signal = &input[search_start..search_end + overlap];
            let corr = self.fft_cross_correlate(&reference, search_signal);
            let norm = 1.0 / corr.len() as f64;
            corr[..num_candidates]
                .iter()
                .map(|c| c.re as f64 * norm)
                .collect::<Vec<f64>>()
        } else {
            (search_start..=search_end)
                .map(|pos| dot(&reference, &input[pos..pos + overlap]))
                .collect()
        };

        let mut best_pos = nominal;
        let mut best_score = scores[nominal - search_start];
        for (k, &score) in scores.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best_pos = search_start + k;
            }
        }
        best_pos
    }

    /// Computes cross-correlation between two signals using FFT.
    ///
    /// Entry `k` of the result (real part, divided by the buffer length) is
    /// `sum_i ref[i] * search[i + k]`.
    fn fft_cross_correlate(
        &mut self,
        ref_signal: &[f32],
        search_signal: &[f32],
    ) -> Vec<Complex<f32>> {
        let conv_len = search_signal.len() + ref_signal.len() - 1;
        let fft_size = conv_len.next_power_of_two();

        let fft_fwd = self.planner.plan_fft_forward(fft_size);
        let fft_inv = self.planner.plan_fft_inverse(fft_size);

        let mut ref_buf = vec![Complex::new(0.0f32, 0.0); fft_size];
        for (slot, &s) in ref_buf.iter_mut().zip(ref_signal) {
            *slot = Complex::new(s, 0.0);
        }
        let mut search_buf = vec![Complex::new(0.0f32, 0.0); fft_size];
        for (slot, &s) in search_buf.iter_mut().zip(search_signal) {
            *slot = Complex::new(s, 0.0);
        }

        // conj(Ref) * Search in the frequency domain is correlation in time
        fft_fwd.process(&mut ref_buf);
        fft_fwd.process(&mut search_buf);
        let mut corr_buf: Vec<Complex<f32>> = ref_buf
            .iter()
            .zip(search_buf.iter())
            .map(|(r, s)| r.conj() * s)
            .collect();
        fft_inv.process(&mut corr_buf);
        corr_buf
    }

    /// Adds a Hann-weighted frame read at `input_pos` into the accumulators.
    fn overlap_add(
        &self,
        input: &[f32],
        input_pos: usize,
        output: &mut [f32],
        window_sum: &mut [f32],
        out_pos: usize,
    ) {
        let frame_len = self
            .window
            .len()
            .min(input.len().saturating_sub(input_pos))
            .min(output.len().saturating_sub(out_pos));
        for i in 0..frame_len {
            let w = self.window[i];
            output[out_pos + i] += input[input_pos + i] * w;
            window_sum[out_pos + i] += w;
        }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}
