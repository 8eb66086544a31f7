#![allow(dead_code)]

use std::f32::consts::PI;

use beatstretch::{BeatInfo, Marker, MarkerData};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn gen_sine<F>(freq_hz: f32, sr: u32, n: usize, amp_fn: F) -> Vec<f32>
where
    F: Fn(usize) -> f32,
{
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * freq_hz * i as f32 / sr as f32;
            amp_fn(i) * phase.sin()
        })
        .collect()
}

pub fn gen_impulse_train(period: usize, n: usize, amp: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; n];
    if period == 0 {
        return out;
    }
    for i in (0..n).step_by(period) {
        out[i] = amp;
    }
    out
}

/// Linear ramp from 0.0 to 1.0 inclusive.
pub fn gen_ramp(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n).map(|i| i as f32 / (n - 1) as f32).collect()
}

/// Quiet pad with sharp clicks at the given positions.
pub fn gen_click_pad(sr: u32, n: usize, click_positions: &[usize]) -> Vec<f32> {
    let mut out = gen_sine(220.0, sr, n, |_| 0.05);
    for &p in click_positions {
        if p < n {
            out[p] += 1.0;
        }
        if p + 1 < n {
            out[p + 1] -= 0.7;
        }
    }
    out
}

pub fn windowed_rms(signal: &[f32], start: usize, len: usize) -> f64 {
    if signal.is_empty() || len == 0 {
        return 0.0;
    }
    let start = start.min(signal.len());
    let end = (start + len).min(signal.len());
    if end <= start {
        return 0.0;
    }
    let sum_sq: f64 = signal[start..end]
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    (sum_sq / (end - start) as f64).sqrt()
}

pub fn count_positive_zero_crossings(signal: &[f32], start: usize, end: usize) -> usize {
    if signal.len() < 2 {
        return 0;
    }
    let start = start.min(signal.len() - 1);
    let end = end.min(signal.len());
    if end <= start + 1 {
        return 0;
    }
    (start..end - 1)
        .filter(|&i| signal[i] <= 0.0 && signal[i + 1] > 0.0)
        .count()
}

pub fn estimate_freq_zero_crossings(signal: &[f32], sr: u32, start: usize, end: usize) -> f64 {
    if end <= start + 1 {
        return 0.0;
    }
    let crossings = count_positive_zero_crossings(signal, start, end) as f64;
    crossings / ((end - start) as f64 / sr as f64)
}

pub fn beat(position: usize, deviation: f32) -> BeatInfo {
    BeatInfo {
        position,
        expected_position: position,
        confidence: 1.0,
        deviation,
        energy: 1.0,
    }
}

/// Marker originally at `original`, dragged to `position`.
pub fn moved_marker(original: i64, position: i64, sr: u32) -> Marker {
    MarkerData::new(original, sr).with_position(position, sr).into()
}

/// Small deterministic generator for property-style loops.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform integer in `lo..=hi`.
    pub fn range(&mut self, lo: i64, hi: i64) -> i64 {
        lo + (self.next_u32() as i64) % (hi - lo + 1)
    }
}
