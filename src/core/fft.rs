//! FFT helpers shared by the spectral analyses.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Magnitude spectrum (bins `0..=fft_size/2`) of one windowed frame.
///
/// The FFT size is `window.len()`; `frame` is truncated or zero-padded to it.
pub fn magnitude_spectrum(planner: &mut FftPlanner<f32>, frame: &[f32], window: &[f32]) -> Vec<f32> {
    let fft_size = window.len();
    if fft_size == 0 {
        return Vec::new();
    }
    let mut buf = vec![COMPLEX_ZERO; fft_size];
    for ((slot, &s), &w) in buf.iter_mut().zip(frame).zip(window) {
        *slot = Complex::new(s * w, 0.0);
    }
    planner.plan_fft_forward(fft_size).process(&mut buf);
    buf[..fft_size / 2 + 1].iter().map(|c| c.norm()).collect()
}

/// Centre frequency of an FFT bin in Hz.
#[inline]
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f32 {
    if fft_size == 0 {
        return 0.0;
    }
    bin as f32 * sample_rate as f32 / fft_size as f32
}

/// Frequency of the strongest non-DC bin, or 0 for a silent spectrum.
pub fn dominant_frequency(magnitudes: &[f32], fft_size: usize, sample_rate: u32) -> f32 {
    let mut best_bin = 0;
    let mut best_mag = 0.0f32;
    for (bin, &m) in magnitudes.iter().enumerate().skip(1) {
        if m > best_mag {
            best_mag = m;
            best_bin = bin;
        }
    }
    bin_frequency(best_bin, fft_size, sample_rate)
}
