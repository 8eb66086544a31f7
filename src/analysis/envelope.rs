//! Short-time energy envelope and onset peak picking.

use std::collections::VecDeque;

/// Analysis window length of the energy envelope in samples.
pub const ENVELOPE_WINDOW: usize = 1024;
/// Peaks must be strict maxima over ±this many samples.
pub const PEAK_RADIUS: usize = ENVELOPE_WINDOW / 2;

/// Computes a triangular-weighted short-time energy envelope, normalized so
/// its global maximum is 1.0.
///
/// Each output sample is the squared signal weighted by a triangle of total
/// width `window` centred on that sample. An isolated click therefore yields
/// exactly one strict maximum at the click itself, which a rectangular window
/// would smear into a plateau. Computed in O(n) as two cascaded box filters
/// over prefix sums. Silence yields an all-zero envelope.
pub fn energy_envelope(samples: &[f32], window: usize) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let half = (window / 2).max(1);

    let mut prefix = vec![0.0f64; n + 1];
    for (i, &s) in samples.iter().enumerate() {
        let e = if s.is_finite() { (s as f64) * (s as f64) } else { 0.0 };
        prefix[i + 1] = prefix[i] + e;
    }

    // Trailing box: sum of e[i - half + 1 ..= i]
    let trailing: Vec<f64> = (0..n)
        .map(|i| prefix[i + 1] - prefix[(i + 1).saturating_sub(half)])
        .collect();

    // Leading box over the trailing box gives the triangle
    let mut prefix2 = vec![0.0f64; n + 1];
    for i in 0..n {
        prefix2[i + 1] = prefix2[i] + trailing[i];
    }
    let raw: Vec<f64> = (0..n)
        .map(|i| (prefix2[(i + half).min(n)] - prefix2[i]) / half as f64)
        .collect();

    let max = raw.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; n];
    }
    raw.iter().map(|&v| (v / max) as f32).collect()
}

/// Returns the indices that are strict maxima over ±`radius` samples and
/// exceed `min_energy`, in ascending order.
///
/// The neighbourhood is clamped at the signal edges. Plateaus produce no
/// peak because no sample in them is strictly greater than its neighbours.
pub fn find_peaks(envelope: &[f32], radius: usize, min_energy: f32) -> Vec<usize> {
    if envelope.is_empty() {
        return Vec::new();
    }
    let ahead = max_ahead(envelope, radius);
    let reversed: Vec<f32> = envelope.iter().rev().copied().collect();
    let mut behind = max_ahead(&reversed, radius);
    behind.reverse();

    envelope
        .iter()
        .enumerate()
        .filter(|&(i, &e)| e > min_energy && e > ahead[i] && e > behind[i])
        .map(|(i, _)| i)
        .collect()
}

/// Index of the largest value in `values[range]`, first occurrence on ties.
pub fn argmax_in(values: &[f32], start: usize, end: usize) -> Option<(usize, f32)> {
    let end = end.min(values.len());
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate().take(end).skip(start) {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// For each index `i`, the maximum of `values[i + 1 ..= i + radius]`
/// (clamped), or negative infinity when that range is empty.
fn max_ahead(values: &[f32], radius: usize) -> Vec<f32> {
    let n = values.len();
    let mut out = vec![f32::NEG_INFINITY; n];
    // Indices in (i, i + radius], values strictly decreasing front to back
    let mut deque: VecDeque<usize> = VecDeque::new();
    for i in (0..n).rev() {
        while let Some(&front) = deque.front() {
            if front > i + radius {
                deque.pop_front();
            } else {
                break;
            }
        }
        if let Some(&front) = deque.front() {
            out[i] = values[front];
        }
        while let Some(&back) = deque.back() {
            if values[back] <= values[i] {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);
    }
    out
}
