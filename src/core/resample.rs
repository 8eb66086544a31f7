//! Length-changing interpolation used by the non-pitch-preserving stretch path.

/// Catmull-Rom cubic interpolation between `y1` and `y2` at fraction `t`.
#[inline]
pub fn catmull_rom(y0: f32, y1: f32, y2: f32, y3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a0 = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let a1 = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let a2 = -0.5 * y0 + 0.5 * y2;
    let a3 = y1;

    a0 * t3 + a1 * t2 + a2 * t + a3
}

/// Resamples `input` to exactly `output_len` samples with Catmull-Rom
/// interpolation.
///
/// Output sample `i` reads source position `i * (len - 1) / (output_len - 1)`,
/// so the first and last output samples land exactly on the first and last
/// input samples. Neighbour indices are clamped at the edges.
pub fn resample_catmull_rom(input: &[f32], output_len: usize) -> Vec<f32> {
    if input.is_empty() || output_len == 0 {
        return vec![];
    }
    if input.len() == 1 {
        return vec![input[0]; output_len];
    }

    let last = input.len() - 1;
    let step = if output_len > 1 {
        last as f64 / (output_len - 1) as f64
    } else {
        0.0
    };

    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let pos = (i as f64 * step).clamp(0.0, last as f64);
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;

        let y0 = input[idx.saturating_sub(1)];
        let y1 = input[idx];
        let y2 = input[(idx + 1).min(last)];
        let y3 = input[(idx + 2).min(last)];

        output.push(catmull_rom(y0, y1, y2, y3, frac));
    }

    output
}
